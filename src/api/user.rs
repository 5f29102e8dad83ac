use actix_web::{web, HttpResponse};
use serde_json::json;

use super::validation::{validate_display_name, validate_password, validate_profile_color};
use super::AppState;
use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::models::*;

// ==================== Profile ====================

pub async fn get_profile(
    state: web::Data<AppState>,
    auth_user: AuthUser,
) -> ApiResult<HttpResponse> {
    let user = state.store.get_user(&auth_user.user_id)?;
    let has_security_questions = state.store.has_security_questions(&user.id)?;
    Ok(HttpResponse::Ok().json(ProfileResponse {
        user,
        has_security_questions,
    }))
}

/// Apply whichever settings are present in the body
pub async fn update_profile(
    state: web::Data<AppState>,
    auth_user: AuthUser,
    body: web::Json<UpdateProfileRequest>,
) -> ApiResult<HttpResponse> {
    let mut user = state.store.get_user(&auth_user.user_id)?;

    if let Some(ref name) = body.display_name {
        user.display_name = validate_display_name(name)?;
    }
    if let Some(dark_mode) = body.dark_mode {
        user.dark_mode = dark_mode;
    }
    if let Some(ref picture) = body.profile_picture {
        // An empty picture clears it
        let picture = picture.trim();
        user.profile_picture = (!picture.is_empty()).then(|| picture.to_string());
    }
    if let Some(ref color) = body.profile_color {
        user.profile_color = validate_profile_color(color)?;
    }

    state.store.update_user(&user)?;
    Ok(HttpResponse::Ok().json(user))
}

pub async fn change_password(
    state: web::Data<AppState>,
    auth_user: AuthUser,
    body: web::Json<ChangePasswordRequest>,
) -> ApiResult<HttpResponse> {
    validate_password(&body.new_password)?;

    let mut user = state.store.get_user(&auth_user.user_id)?;
    let valid = state
        .auth_service
        .verify_password(&body.current_password, &user.password_hash)
        .unwrap_or(false);
    if !valid {
        return Err(ApiError::Unauthorized("Current password is incorrect".to_string()));
    }

    user.password_hash = state.auth_service.hash_password(&body.new_password)?;
    state.store.update_user(&user)?;

    state.audit(LogLevel::Security, "password_changed", Some(&user.id), Some(&user.username), None);

    Ok(HttpResponse::Ok().json(MessageResponse::new("Password changed successfully")))
}

// ==================== Security Questions ====================

pub async fn set_security_questions(
    state: web::Data<AppState>,
    auth_user: AuthUser,
    body: web::Json<SetSecurityQuestionsRequest>,
) -> ApiResult<HttpResponse> {
    state
        .store
        .set_security_questions(&auth_user.user_id, &body.questions)?;

    state.audit(
        LogLevel::Info,
        "security_questions_set",
        Some(&auth_user.user_id),
        Some(&auth_user.username),
        Some(json!({ "count": body.questions.len() })),
    );

    Ok(HttpResponse::Ok().json(MessageResponse::new("Security questions saved successfully")))
}

pub async fn verify_security_answers(
    state: web::Data<AppState>,
    auth_user: AuthUser,
    body: web::Json<VerifyAnswersRequest>,
) -> ApiResult<HttpResponse> {
    let verified = state
        .store
        .verify_security_answers(&auth_user.user_id, &body.answers)?;
    Ok(HttpResponse::Ok().json(json!({ "verified": verified })))
}

// ==================== Account ====================

/// Delete the caller's account with all of its meals, grants and questions
pub async fn delete_account(
    state: web::Data<AppState>,
    auth_user: AuthUser,
) -> ApiResult<HttpResponse> {
    let user = state.store.delete_user(&auth_user.user_id)?;

    log::info!("User {} deleted their account", user.username);
    state.audit(LogLevel::Warning, "account_deleted", Some(&user.id), Some(&user.username), None);

    Ok(HttpResponse::Ok().json(MessageResponse::new("Account deleted successfully")))
}
