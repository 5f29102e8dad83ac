use actix_web::{web, HttpResponse};
use serde_json::json;

use super::validation::{history_limit, parse_date};
use super::AppState;
use crate::auth::{ensure_can_view, AuthUser};
use crate::error::ApiResult;
use crate::models::*;

// ==================== Own Ledger ====================

/// Create or overwrite the entry for (caller, date, slot)
pub async fn upsert_meal(
    state: web::Data<AppState>,
    auth_user: AuthUser,
    body: web::Json<UpsertMealRequest>,
) -> ApiResult<HttpResponse> {
    let drinks = body.drink_set();
    let (meal, outcome) = state.store.upsert_meal(
        &auth_user.user_id,
        body.date,
        body.meal_type,
        body.food_description.trim(),
        &drinks,
    )?;

    Ok(match outcome {
        UpsertOutcome::Created => HttpResponse::Created().json(meal),
        UpsertOutcome::Updated => HttpResponse::Ok().json(meal),
    })
}

pub async fn get_history(
    state: web::Data<AppState>,
    auth_user: AuthUser,
    query: web::Query<LimitQuery>,
) -> ApiResult<HttpResponse> {
    let meals = state
        .store
        .get_meal_history(&auth_user.user_id, history_limit(query.limit))?;
    Ok(HttpResponse::Ok().json(meals))
}

pub async fn get_meals_by_date(
    state: web::Data<AppState>,
    auth_user: AuthUser,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let date = parse_date(&path.into_inner())?;
    let meals = state.store.get_meals_by_date(&auth_user.user_id, date)?;
    Ok(HttpResponse::Ok().json(meals))
}

pub async fn delete_meal(
    state: web::Data<AppState>,
    auth_user: AuthUser,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let id = path.into_inner();
    state.store.delete_meal(&id, &auth_user.user_id)?;

    state.audit(
        LogLevel::Info,
        "meal_deleted",
        Some(&auth_user.user_id),
        Some(&auth_user.username),
        Some(json!({ "meal_id": id })),
    );

    Ok(HttpResponse::Ok().json(MessageResponse::new("Meal deleted successfully")))
}

// ==================== Shared Ledgers ====================

pub async fn get_user_history(
    state: web::Data<AppState>,
    auth_user: AuthUser,
    path: web::Path<String>,
    query: web::Query<LimitQuery>,
) -> ApiResult<HttpResponse> {
    let owner_id = path.into_inner();
    ensure_can_view(&state.store, &auth_user, &owner_id)?;

    let meals = state
        .store
        .get_meal_history(&owner_id, history_limit(query.limit))?;
    Ok(HttpResponse::Ok().json(meals))
}

pub async fn get_user_meals_by_date(
    state: web::Data<AppState>,
    auth_user: AuthUser,
    path: web::Path<(String, String)>,
) -> ApiResult<HttpResponse> {
    let (owner_id, date) = path.into_inner();
    let date = parse_date(&date)?;
    ensure_can_view(&state.store, &auth_user, &owner_id)?;

    let meals = state.store.get_meals_by_date(&owner_id, date)?;
    Ok(HttpResponse::Ok().json(meals))
}
