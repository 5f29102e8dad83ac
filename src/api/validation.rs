//! Boundary checks shared by the handlers. Everything here fails with
//! `ApiError::Validation`.

use chrono::NaiveDate;

use crate::error::{ApiError, ApiResult};

pub const MIN_USERNAME_LEN: usize = 3;
pub const MAX_USERNAME_LEN: usize = 32;
pub const MIN_PASSWORD_LEN: usize = 6;
pub const MAX_DISPLAY_NAME_LEN: usize = 64;

pub const DEFAULT_HISTORY_LIMIT: i64 = 30;
pub const MAX_HISTORY_LIMIT: i64 = 365;
pub const DEFAULT_LOG_LIMIT: i64 = 100;

pub fn validate_username(username: &str) -> ApiResult<()> {
    let username = username.trim();
    let len = username.chars().count();
    if !(MIN_USERNAME_LEN..=MAX_USERNAME_LEN).contains(&len) {
        return Err(ApiError::Validation(format!(
            "Username must be {}-{} characters",
            MIN_USERNAME_LEN, MAX_USERNAME_LEN
        )));
    }
    if !username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.')
    {
        return Err(ApiError::Validation(
            "Username may only contain letters, digits, '.', '_' and '-'".to_string(),
        ));
    }
    Ok(())
}

pub fn validate_password(password: &str) -> ApiResult<()> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ApiError::Validation(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }
    Ok(())
}

/// Trimmed, non-empty display name
pub fn validate_display_name(display_name: &str) -> ApiResult<String> {
    let display_name = display_name.trim();
    if display_name.is_empty() {
        return Err(ApiError::Validation("Display name is required".to_string()));
    }
    if display_name.chars().count() > MAX_DISPLAY_NAME_LEN {
        return Err(ApiError::Validation(format!(
            "Display name must be at most {} characters",
            MAX_DISPLAY_NAME_LEN
        )));
    }
    Ok(display_name.to_string())
}

/// `#rrggbb`, returned lowercased
pub fn validate_profile_color(color: &str) -> ApiResult<String> {
    let color = color.trim();
    let valid = color.len() == 7
        && color.starts_with('#')
        && color[1..].chars().all(|c| c.is_ascii_hexdigit());
    if !valid {
        return Err(ApiError::Validation(
            "Profile color must be a hex color like #667eea".to_string(),
        ));
    }
    Ok(color.to_lowercase())
}

pub fn parse_date(raw: &str) -> ApiResult<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|_| ApiError::Validation(format!("Invalid date '{}', expected YYYY-MM-DD", raw)))
}

pub fn history_limit(limit: Option<i64>) -> i64 {
    limit
        .unwrap_or(DEFAULT_HISTORY_LIMIT)
        .clamp(1, MAX_HISTORY_LIMIT)
}

pub fn log_limit(limit: Option<i64>) -> i64 {
    limit
        .unwrap_or(DEFAULT_LOG_LIMIT)
        .clamp(1, crate::store::AUDIT_LOG_CAPACITY)
}
