use actix_web::dev::Payload;
use actix_web::{web, FromRequest, HttpRequest};
use chrono::{Duration, Utc};
use futures_util::future::{ready, Ready};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::api::AppState;
use crate::config::AdminBootstrap;
use crate::error::{ApiError, ApiResult};
use crate::models::User;
use crate::store::{Store, StoreError};

/// bcrypt work factor for passwords and security answers
pub const BCRYPT_COST: u32 = 10;

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,      // user_id
    pub username: String,
    pub is_admin: bool,
    pub exp: i64,         // expiration timestamp
    pub iat: i64,         // issued at
}

pub struct AuthService {
    jwt_secret: String,
    token_ttl: Duration,
}

impl AuthService {
    pub fn new(jwt_secret: String) -> Self {
        Self {
            jwt_secret,
            token_ttl: Duration::days(7),
        }
    }

    pub fn with_token_ttl(mut self, token_ttl: Duration) -> Self {
        self.token_ttl = token_ttl;
        self
    }

    /// Hash a password using bcrypt
    pub fn hash_password(&self, password: &str) -> Result<String, bcrypt::BcryptError> {
        bcrypt::hash(password, BCRYPT_COST)
    }

    /// Verify a password against a bcrypt hash
    pub fn verify_password(&self, password: &str, hash: &str) -> Result<bool, bcrypt::BcryptError> {
        bcrypt::verify(password, hash)
    }

    /// Generate a JWT token for a user
    pub fn generate_token(&self, user: &User) -> Result<String, jsonwebtoken::errors::Error> {
        let now = Utc::now();
        let exp = now + self.token_ttl;

        let claims = Claims {
            sub: user.id.clone(),
            username: user.username.clone(),
            is_admin: user.is_admin,
            exp: exp.timestamp(),
            iat: now.timestamp(),
        };

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.jwt_secret.as_bytes()),
        )
    }

    /// Validate a JWT token and return the claims
    pub fn validate_token(&self, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
        let token_data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.jwt_secret.as_bytes()),
            &Validation::default(),
        )?;
        Ok(token_data.claims)
    }
}

/// Authenticated caller, taken from a valid bearer token
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: String,
    pub username: String,
}

impl FromRequest for AuthUser {
    type Error = ApiError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(app_state(req).and_then(|state| extract_auth(req, &state.auth_service)))
    }
}

/// Authenticated caller whose stored account currently carries the admin flag.
/// The flag is re-read from the store so a demoted or deleted admin loses access
/// before their token expires.
#[derive(Debug, Clone)]
pub struct AdminUser(pub AuthUser);

impl FromRequest for AdminUser {
    type Error = ApiError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(app_state(req).and_then(|state| {
            let auth_user = extract_auth(req, &state.auth_service)?;
            match state.store.get_user(&auth_user.user_id) {
                Ok(user) if user.is_admin => Ok(AdminUser(auth_user)),
                Ok(_) => Err(ApiError::Forbidden("Admin access required".to_string())),
                Err(StoreError::NotFound(_)) => {
                    Err(ApiError::Unauthorized("Account no longer exists".to_string()))
                }
                Err(e) => Err(e.into()),
            }
        }))
    }
}

fn app_state(req: &HttpRequest) -> Result<web::Data<AppState>, ApiError> {
    req.app_data::<web::Data<AppState>>()
        .cloned()
        .ok_or_else(|| ApiError::Internal("AppState not registered".to_string()))
}

/// Extract auth info from request
fn extract_auth(req: &HttpRequest, auth_service: &AuthService) -> Result<AuthUser, ApiError> {
    let auth_header = req
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| ApiError::Unauthorized("Access token required".to_string()))?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or_else(|| ApiError::Unauthorized("Invalid Authorization header format".to_string()))?;

    let claims = auth_service
        .validate_token(token.trim())
        .map_err(|_| ApiError::Unauthorized("Invalid or expired token".to_string()))?;

    Ok(AuthUser {
        user_id: claims.sub,
        username: claims.username,
    })
}

/// Gate for reading someone else's meal ledger: the owner themselves, or a
/// viewer the owner has granted access to. Anything else is `Forbidden`,
/// including owners that do not exist.
pub fn ensure_can_view(store: &Store, viewer: &AuthUser, owner_id: &str) -> ApiResult<()> {
    if viewer.user_id == owner_id {
        return Ok(());
    }
    if store.check_access(owner_id, &viewer.user_id)? {
        return Ok(());
    }
    Err(ApiError::Forbidden("Access denied".to_string()))
}

/// Make sure the configured admin account exists and carries the admin flag.
/// An existing user with that name is promoted; its password is left alone.
pub fn bootstrap_admin(
    store: &Store,
    auth_service: &AuthService,
    admin: &AdminBootstrap,
) -> ApiResult<User> {
    match store.get_user_by_username(&admin.username) {
        Ok(mut user) => {
            if !user.is_admin {
                log::info!("Promoting existing user {} to admin", user.username);
                user.is_admin = true;
                store.update_user(&user)?;
            }
            Ok(user)
        }
        Err(StoreError::NotFound(_)) => {
            log::info!("Creating admin user from environment: {}", admin.username);
            let password_hash = auth_service.hash_password(&admin.password)?;
            let display_name = admin.display_name.as_deref().unwrap_or(&admin.username);
            let mut user = User::new(&admin.username, password_hash, display_name);
            user.is_admin = true;
            store.create_user(&mut user)?;
            Ok(user)
        }
        Err(e) => Err(e.into()),
    }
}
