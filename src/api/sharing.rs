use actix_web::{web, HttpResponse};
use serde_json::json;

use super::AppState;
use crate::auth::AuthUser;
use crate::error::ApiResult;
use crate::models::*;

pub async fn grant_access(
    state: web::Data<AppState>,
    auth_user: AuthUser,
    body: web::Json<GrantAccessRequest>,
) -> ApiResult<HttpResponse> {
    let grant = state
        .store
        .grant_access(&auth_user.user_id, &body.viewer_username)?;

    state.audit(
        LogLevel::Info,
        "access_granted",
        Some(&auth_user.user_id),
        Some(&auth_user.username),
        Some(json!({ "viewer_id": grant.viewer_id })),
    );

    Ok(HttpResponse::Ok().json(grant))
}

pub async fn revoke_access(
    state: web::Data<AppState>,
    auth_user: AuthUser,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let viewer = state
        .store
        .revoke_access(&auth_user.user_id, &path.into_inner())?;

    state.audit(
        LogLevel::Info,
        "access_revoked",
        Some(&auth_user.user_id),
        Some(&auth_user.username),
        Some(json!({ "viewer_id": viewer.id, "viewer_username": viewer.username })),
    );

    Ok(HttpResponse::Ok().json(MessageResponse::new("Access revoked successfully")))
}

/// Users the caller has granted access to
pub async fn shared_by_me(
    state: web::Data<AppState>,
    auth_user: AuthUser,
) -> ApiResult<HttpResponse> {
    let users = state.store.list_granted_by(&auth_user.user_id)?;
    Ok(HttpResponse::Ok().json(users))
}

/// Users whose ledgers the caller may read
pub async fn shared_with_me(
    state: web::Data<AppState>,
    auth_user: AuthUser,
) -> ApiResult<HttpResponse> {
    let users = state.store.list_shared_with(&auth_user.user_id)?;
    Ok(HttpResponse::Ok().json(users))
}
