use actix_web::{error, web, HttpRequest, HttpResponse, Responder};
use chrono::Utc;
use std::sync::Arc;

use crate::auth::AuthService;
use crate::error::ApiError;
use crate::models::LogLevel;
use crate::store::Store;

mod admin;
mod auth;
mod meals;
mod sharing;
mod user;
mod validation;

pub struct AppState {
    pub store: Arc<Store>,
    pub auth_service: Arc<AuthService>,
}

impl AppState {
    /// Append an audit record. A failing audit write is logged and never fails
    /// the request that triggered it.
    pub(crate) fn audit(
        &self,
        level: LogLevel,
        action: &str,
        user_id: Option<&str>,
        username: Option<&str>,
        details: Option<serde_json::Value>,
    ) {
        if let Err(e) = self.store.append_log(level, action, user_id, username, details) {
            log::error!("Failed to write audit record '{}': {}", action, e);
        }
    }
}

// ==================== Health Check ====================

pub async fn health() -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "ok",
        "timestamp": Utc::now().to_rfc3339()
    }))
}

// ==================== Extractor Configuration ====================

fn json_error(err: error::JsonPayloadError, _req: &HttpRequest) -> error::Error {
    ApiError::Validation(format!("Invalid request body: {}", err)).into()
}

fn query_error(err: error::QueryPayloadError, _req: &HttpRequest) -> error::Error {
    ApiError::Validation(format!("Invalid query string: {}", err)).into()
}

fn path_error(err: error::PathError, _req: &HttpRequest) -> error::Error {
    ApiError::Validation(format!("Invalid path: {}", err)).into()
}

/// Turn malformed bodies, query strings and paths into `{ "error": ... }` 400s
pub fn configure_extractors(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().error_handler(json_error))
        .app_data(web::QueryConfig::default().error_handler(query_error))
        .app_data(web::PathConfig::default().error_handler(path_error));
}

// ==================== Route Configuration ====================

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    configure_extractors(cfg);

    cfg
        // Health check
        .route("/health", web::get().to(health))

        // Auth routes (no auth required)
        .route("/api/auth/register", web::post().to(auth::register))
        .route("/api/auth/login", web::post().to(auth::login))
        .route(
            "/api/auth/security-questions/{username}",
            web::get().to(auth::get_security_questions),
        )
        .route("/api/auth/reset-password", web::post().to(auth::reset_password))

        // Meals; the user routes go first so "user" is never read as a date
        .route("/api/meals", web::post().to(meals::upsert_meal))
        .route("/api/meals", web::get().to(meals::get_history))
        .route("/api/meals/user/{user_id}", web::get().to(meals::get_user_history))
        .route("/api/meals/user/{user_id}/{date}", web::get().to(meals::get_user_meals_by_date))
        .route("/api/meals/{date}", web::get().to(meals::get_meals_by_date))
        .route("/api/meals/{id}", web::delete().to(meals::delete_meal))

        // Sharing
        .route("/api/share-access", web::post().to(sharing::grant_access))
        .route("/api/share-access/{username}", web::delete().to(sharing::revoke_access))
        .route("/api/shared-by-me", web::get().to(sharing::shared_by_me))
        .route("/api/shared-with-me", web::get().to(sharing::shared_with_me))

        // Account
        .route("/api/user", web::delete().to(user::delete_account))
        .route("/api/user/profile", web::get().to(user::get_profile))
        .route("/api/user/profile", web::patch().to(user::update_profile))
        .route("/api/user/password", web::patch().to(user::change_password))
        .route("/api/user/security-questions", web::put().to(user::set_security_questions))
        .route(
            "/api/user/verify-security-answers",
            web::post().to(user::verify_security_answers),
        )

        // Admin
        .route("/api/admin/users", web::get().to(admin::list_users))
        .route("/api/admin/users/{id}", web::delete().to(admin::delete_user))
        .route(
            "/api/admin/users/{id}/security-questions",
            web::get().to(admin::get_security_questions),
        )
        .route("/api/admin/analytics", web::get().to(admin::analytics))
        .route("/api/admin/reset-password", web::post().to(admin::reset_password))
        .route("/api/admin/logs", web::get().to(admin::list_logs));
}
