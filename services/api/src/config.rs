//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development. The loaded value is immutable and is
//! shared through `AppState`.

use std::net::SocketAddr;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone)]
pub struct Config {
    pub bind_address: SocketAddr,
    /// `None` selects the in-memory store.
    pub database_url: Option<String>,
    pub log_level: Level,
    pub jwt_secret: String,
    pub token_expire_hours: i64,
    /// Set the `Secure` attribute on the token cookie.
    pub secure_cookies: bool,
    pub cors_origin: String,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("bind_address", &self.bind_address)
            .field("database_url", &self.database_url.as_ref().map(|_| "<redacted>"))
            .field("log_level", &self.log_level)
            .field("token_expire_hours", &self.token_expire_hours)
            .field("secure_cookies", &self.secure_cookies)
            .field("cors_origin", &self.cors_origin)
            .finish_non_exhaustive()
    }
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination.
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // --- Load Server and Database Settings ---
        let bind_address_str =
            lookup("BIND_ADDRESS").unwrap_or_else(|| "0.0.0.0:3000".to_string());
        let bind_address = bind_address_str.parse::<SocketAddr>().map_err(|e| {
            ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string())
        })?;

        let database_url = lookup("DATABASE_URL").filter(|url| !url.trim().is_empty());

        let log_level_str = lookup("RUST_LOG").unwrap_or_else(|| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        // --- Load Token Settings ---
        let jwt_secret = lookup("JWT_SECRET")
            .filter(|secret| !secret.is_empty())
            .ok_or_else(|| ConfigError::MissingVar("JWT_SECRET".to_string()))?;

        let token_expire_hours = match lookup("JWT_COOKIE_EXPIRE_HOURS") {
            Some(raw) => raw
                .trim()
                .parse::<i64>()
                .ok()
                .filter(|hours| *hours > 0)
                .ok_or_else(|| {
                    ConfigError::InvalidValue(
                        "JWT_COOKIE_EXPIRE_HOURS".to_string(),
                        format!("'{}' is not a positive number of hours", raw),
                    )
                })?,
            None => 24,
        };

        let secure_cookies = lookup("NODE_ENV").is_some_and(|env| env == "production");

        let cors_origin =
            lookup("CORS_ORIGIN").unwrap_or_else(|| "http://localhost:3000".to_string());

        Ok(Self {
            bind_address,
            database_url,
            log_level,
            jwt_secret,
            token_expire_hours,
            secure_cookies,
            cors_origin,
        })
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
    fn defaults_apply_when_only_the_secret_is_set() {
        let config = load(&[("JWT_SECRET", "s3cret")]).unwrap();
        assert_eq!(config.bind_address.to_string(), "0.0.0.0:3000");
        assert_eq!(config.database_url, None);
        assert_eq!(config.token_expire_hours, 24);
        assert!(!config.secure_cookies);
    }

    #[test]
    fn secret_is_required() {
        assert!(matches!(load(&[]), Err(ConfigError::MissingVar(var)) if var == "JWT_SECRET"));
        assert!(matches!(
            load(&[("JWT_SECRET", "")]),
            Err(ConfigError::MissingVar(_))
        ));
    }

    #[test]
    fn expiry_must_be_positive() {
        for bad in ["0", "-4", "soon"] {
            assert!(matches!(
                load(&[("JWT_SECRET", "s"), ("JWT_COOKIE_EXPIRE_HOURS", bad)]),
                Err(ConfigError::InvalidValue(..))
            ));
        }
        let config = load(&[("JWT_SECRET", "s"), ("JWT_COOKIE_EXPIRE_HOURS", "72")]).unwrap();
        assert_eq!(config.token_expire_hours, 72);
    }

    #[test]
    fn production_enables_secure_cookies() {
        let config = load(&[("JWT_SECRET", "s"), ("NODE_ENV", "production")]).unwrap();
        assert!(config.secure_cookies);
        let config = load(&[("JWT_SECRET", "s"), ("NODE_ENV", "development")]).unwrap();
        assert!(!config.secure_cookies);
    }
}
