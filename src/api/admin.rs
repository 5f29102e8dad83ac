use actix_web::{web, HttpResponse};
use chrono::Utc;
use serde_json::json;

use super::validation::{log_limit, validate_password};
use super::AppState;
use crate::auth::AdminUser;
use crate::error::{ApiError, ApiResult};
use crate::models::*;

// ==================== Admin Endpoints ====================

pub async fn list_users(
    state: web::Data<AppState>,
    _admin: AdminUser,
) -> ApiResult<HttpResponse> {
    let users = state.store.list_users()?;
    Ok(HttpResponse::Ok().json(users))
}

pub async fn analytics(
    state: web::Data<AppState>,
    _admin: AdminUser,
) -> ApiResult<HttpResponse> {
    let stats = state.store.analytics(Utc::now().date_naive())?;
    Ok(HttpResponse::Ok().json(stats))
}

/// Question texts of a user; answers are stored hashed and never returned
pub async fn get_security_questions(
    state: web::Data<AppState>,
    _admin: AdminUser,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let user = state.store.get_user(&path.into_inner())?;
    let questions = state.store.get_security_questions(&user.id)?;
    Ok(HttpResponse::Ok().json(json!({
        "user_id": user.id,
        "username": user.username,
        "questions": questions,
    })))
}

pub async fn reset_password(
    state: web::Data<AppState>,
    AdminUser(admin): AdminUser,
    body: web::Json<AdminResetPasswordRequest>,
) -> ApiResult<HttpResponse> {
    validate_password(&body.new_password)?;

    let mut user = state.store.get_user(&body.user_id)?;
    user.password_hash = state.auth_service.hash_password(&body.new_password)?;
    state.store.update_user(&user)?;

    state.audit(
        LogLevel::Security,
        "password_reset_by_admin",
        Some(&admin.user_id),
        Some(&admin.username),
        Some(json!({ "target_user_id": user.id, "target_username": user.username })),
    );

    Ok(HttpResponse::Ok().json(MessageResponse::new("Password reset successfully")))
}

pub async fn delete_user(
    state: web::Data<AppState>,
    AdminUser(admin): AdminUser,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let id = path.into_inner();
    if id == admin.user_id {
        return Err(ApiError::Validation("Cannot delete your own account here".to_string()));
    }

    let user = state.store.delete_user(&id)?;

    log::warn!("Admin {} deleted user {}", admin.username, user.username);
    state.audit(
        LogLevel::Warning,
        "user_deleted_by_admin",
        Some(&admin.user_id),
        Some(&admin.username),
        Some(json!({ "target_user_id": user.id, "target_username": user.username })),
    );

    Ok(HttpResponse::Ok().json(MessageResponse::new("User deleted successfully")))
}

pub async fn list_logs(
    state: web::Data<AppState>,
    _admin: AdminUser,
    query: web::Query<LimitQuery>,
) -> ApiResult<HttpResponse> {
    let logs = state.store.list_logs(log_limit(query.limit))?;
    Ok(HttpResponse::Ok().json(logs))
}
