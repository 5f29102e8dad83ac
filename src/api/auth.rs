use actix_web::{web, HttpResponse};
use serde_json::json;

use super::validation::{validate_display_name, validate_password, validate_username};
use super::AppState;
use crate::error::{ApiError, ApiResult};
use crate::models::*;
use crate::store::StoreError;

// ==================== Auth Endpoints ====================

pub async fn register(
    state: web::Data<AppState>,
    body: web::Json<RegisterRequest>,
) -> ApiResult<HttpResponse> {
    validate_username(&body.username)?;
    validate_password(&body.password)?;
    let display_name = match body.display_name.as_deref() {
        Some(name) => validate_display_name(name)?,
        None => body.username.trim().to_string(),
    };

    let password_hash = state.auth_service.hash_password(&body.password)?;
    let mut user = User::new(&body.username, password_hash, &display_name);
    state.store.create_user(&mut user)?;

    let token = state.auth_service.generate_token(&user)?;

    log::info!("Registered user {}", user.username);
    state.audit(
        LogLevel::Info,
        "user_registered",
        Some(&user.id),
        Some(&user.username),
        None,
    );

    Ok(HttpResponse::Created().json(LoginResponse { token, user }))
}

pub async fn login(
    state: web::Data<AppState>,
    body: web::Json<LoginRequest>,
) -> ApiResult<HttpResponse> {
    let user = match state.store.get_user_by_username(&body.username) {
        Ok(u) => u,
        Err(StoreError::NotFound(_)) => {
            state.audit(
                LogLevel::Security,
                "login_failed",
                None,
                Some(&normalize_username(&body.username)),
                Some(json!({ "reason": "unknown user" })),
            );
            return Err(invalid_credentials());
        }
        Err(e) => return Err(e.into()),
    };

    let valid = state
        .auth_service
        .verify_password(&body.password, &user.password_hash)
        .unwrap_or(false);

    if !valid {
        state.audit(
            LogLevel::Security,
            "login_failed",
            Some(&user.id),
            Some(&user.username),
            Some(json!({ "reason": "wrong password" })),
        );
        return Err(invalid_credentials());
    }

    let token = state.auth_service.generate_token(&user)?;
    state.audit(LogLevel::Info, "login_success", Some(&user.id), Some(&user.username), None);

    Ok(HttpResponse::Ok().json(LoginResponse { token, user }))
}

fn invalid_credentials() -> ApiError {
    ApiError::Unauthorized("Invalid credentials".to_string())
}

// ==================== Forgot Password ====================

pub async fn get_security_questions(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let username = path.into_inner();
    let questions = state.store.get_public_security_questions(&username)?;
    Ok(HttpResponse::Ok().json(json!({ "questions": questions })))
}

pub async fn reset_password(
    state: web::Data<AppState>,
    body: web::Json<ResetPasswordRequest>,
) -> ApiResult<HttpResponse> {
    validate_password(&body.new_password)?;

    let mut user = state.store.get_user_by_username(&body.username)?;

    if !state.store.verify_security_answers(&user.id, &body.answers)? {
        state.audit(
            LogLevel::Security,
            "password_reset_failed",
            Some(&user.id),
            Some(&user.username),
            None,
        );
        return Err(ApiError::Unauthorized("Security answers incorrect".to_string()));
    }

    user.password_hash = state.auth_service.hash_password(&body.new_password)?;
    state.store.update_user(&user)?;

    state.audit(LogLevel::Security, "password_reset", Some(&user.id), Some(&user.username), None);

    Ok(HttpResponse::Ok().json(MessageResponse::new("Password reset successfully")))
}
