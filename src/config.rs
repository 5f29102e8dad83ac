use std::{env, fmt::Display, str::FromStr};

use chrono::Duration;
use thiserror::Error;

const DEV_JWT_SECRET: &str = "default_jwt_secret_change_me";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid {key} value '{value}': {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Credentials for the admin account created at startup
#[derive(Debug, Clone)]
pub struct AdminBootstrap {
    pub username: String,
    pub password: String,
    pub display_name: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub bind_address: String,
    pub database_path: String,
    pub jwt_secret: String,
    pub token_ttl: Duration,
    pub admin: Option<AdminBootstrap>,
}

impl Config {
    /// Read the configuration from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let jwt_secret = lookup("JWT_SECRET").unwrap_or_else(|| {
            log::warn!("JWT_SECRET not set, using default (not secure for production!)");
            DEV_JWT_SECRET.to_string()
        });

        let token_ttl_days: i64 = try_load(&lookup, "TOKEN_TTL_DAYS", 7)?;
        if token_ttl_days <= 0 {
            return Err(ConfigError::Invalid {
                key: "TOKEN_TTL_DAYS",
                value: token_ttl_days.to_string(),
                reason: "must be positive".to_string(),
            });
        }

        let admin = match (lookup("ADMIN_USERNAME"), lookup("ADMIN_PASSWORD")) {
            (Some(username), Some(password)) => Some(AdminBootstrap {
                username,
                password,
                display_name: lookup("ADMIN_DISPLAY_NAME"),
            }),
            (Some(_), None) | (None, Some(_)) => {
                log::warn!("ADMIN_USERNAME and ADMIN_PASSWORD must both be set, skipping admin bootstrap");
                None
            }
            (None, None) => None,
        };

        Ok(Self {
            port: try_load(&lookup, "PORT", 8080)?,
            bind_address: lookup("BIND_ADDRESS").unwrap_or_else(|| "0.0.0.0".to_string()),
            database_path: lookup("DATABASE_PATH").unwrap_or_else(|| "mealtrack.db".to_string()),
            jwt_secret,
            token_ttl: Duration::days(token_ttl_days),
            admin,
        })
    }
}

fn try_load<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr + Display,
    T::Err: Display,
{
    match lookup(key) {
        Some(value) => {
            let parsed = value.trim().parse::<T>();
            parsed.map_err(|e| ConfigError::Invalid {
                key,
                reason: e.to_string(),
                value,
            })
        }
        None => {
            log::info!("{} not set, using default: {}", key, default);
            Ok(default)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[]).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.bind_address, "0.0.0.0");
        assert_eq!(config.database_path, "mealtrack.db");
        assert_eq!(config.jwt_secret, DEV_JWT_SECRET);
        assert_eq!(config.token_ttl, Duration::days(7));
        assert!(config.admin.is_none());
    }

    #[test]
    fn test_overrides() {
        let config = load(&[
            ("PORT", "9000"),
            ("DATABASE_PATH", "/tmp/meals.db"),
            ("JWT_SECRET", "s3cret"),
            ("TOKEN_TTL_DAYS", "1"),
            ("ADMIN_USERNAME", "root"),
            ("ADMIN_PASSWORD", "hunter22"),
        ])
        .unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.database_path, "/tmp/meals.db");
        assert_eq!(config.jwt_secret, "s3cret");
        assert_eq!(config.token_ttl, Duration::days(1));
        let admin = config.admin.unwrap();
        assert_eq!(admin.username, "root");
        assert!(admin.display_name.is_none());
    }

    #[test]
    fn test_invalid_values() {
        assert!(matches!(
            load(&[("PORT", "eighty")]),
            Err(ConfigError::Invalid { key: "PORT", .. })
        ));
        assert!(load(&[("TOKEN_TTL_DAYS", "0")]).is_err());
    }

    #[test]
    fn test_partial_admin_is_ignored() {
        let config = load(&[("ADMIN_USERNAME", "root")]).unwrap();
        assert!(config.admin.is_none());
    }
}
