//! Configuration loading and representation.
//!
//! Everything comes from the process environment; unset keys fall back to
//! development defaults, malformed values are errors.

use std::net::SocketAddr;

use chrono::Duration;
use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {key}: {message}")]
    Invalid { key: &'static str, message: String },
}

/// Administrator account created at startup if missing.
#[derive(Clone, PartialEq, Eq)]
pub struct BootstrapAdmin {
    pub registration_number: String,
    pub password: String,
}

impl core::fmt::Debug for BootstrapAdmin {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("BootstrapAdmin")
            .field("registration_number", &self.registration_number)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Clone, PartialEq)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    /// `None` selects the in-memory store.
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub jwt_secret: String,
    pub token_ttl: Duration,
    pub request_number_attempts: u32,
    /// Post `out`/`in` ledger rows when delivery/return quantities are recorded.
    pub post_request_movements: bool,
    pub low_stock_multiplier: Decimal,
    pub bootstrap_admin: Option<BootstrapAdmin>,
}

pub const DEV_JWT_SECRET: &str = "dev-secret";

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            database_url: None,
            database_max_connections: 10,
            jwt_secret: DEV_JWT_SECRET.to_string(),
            token_ttl: Duration::minutes(1440),
            request_number_attempts: 10,
            post_request_movements: true,
            low_stock_multiplier: Decimal::ONE,
            bootstrap_admin: None,
        }
    }
}

impl core::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AppConfig")
            .field("bind_addr", &self.bind_addr)
            .field("database", &self.database_url.as_ref().map(|_| "<set>"))
            .field("database_max_connections", &self.database_max_connections)
            .field("token_ttl_minutes", &self.token_ttl.num_minutes())
            .field("request_number_attempts", &self.request_number_attempts)
            .field("post_request_movements", &self.post_request_movements)
            .field("low_stock_multiplier", &self.low_stock_multiplier)
            .field("bootstrap_admin", &self.bootstrap_admin)
            .finish_non_exhaustive()
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup (the environment in production, a map in tests).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let bind_addr = match get("BIND_ADDR") {
            Some(v) => v.parse().map_err(|e: std::net::AddrParseError| invalid("BIND_ADDR", e))?,
            None => defaults.bind_addr,
        };
        let database_max_connections = parse_or("DATABASE_MAX_CONNECTIONS", get("DATABASE_MAX_CONNECTIONS"), defaults.database_max_connections)?;
        let ttl_minutes: i64 = parse_or("TOKEN_TTL_MINUTES", get("TOKEN_TTL_MINUTES"), defaults.token_ttl.num_minutes())?;
        if ttl_minutes <= 0 {
            return Err(invalid("TOKEN_TTL_MINUTES", "must be positive"));
        }
        let request_number_attempts: u32 = parse_or("REQUEST_NUMBER_ATTEMPTS", get("REQUEST_NUMBER_ATTEMPTS"), defaults.request_number_attempts)?;
        if request_number_attempts == 0 {
            return Err(invalid("REQUEST_NUMBER_ATTEMPTS", "must be at least 1"));
        }
        let post_request_movements = match get("POST_REQUEST_MOVEMENTS") {
            Some(v) => parse_bool("POST_REQUEST_MOVEMENTS", &v)?,
            None => defaults.post_request_movements,
        };
        let low_stock_multiplier: Decimal = parse_or("LOW_STOCK_MULTIPLIER", get("LOW_STOCK_MULTIPLIER"), defaults.low_stock_multiplier)?;
        if low_stock_multiplier < Decimal::ZERO {
            return Err(invalid("LOW_STOCK_MULTIPLIER", "cannot be negative"));
        }

        let bootstrap_admin = match (get("BOOTSTRAP_ADMIN_REGISTRATION"), get("BOOTSTRAP_ADMIN_PASSWORD")) {
            (Some(registration_number), Some(password)) => Some(BootstrapAdmin {
                registration_number,
                password,
            }),
            (None, None) => None,
            _ => {
                return Err(invalid(
                    "BOOTSTRAP_ADMIN_REGISTRATION",
                    "BOOTSTRAP_ADMIN_REGISTRATION and BOOTSTRAP_ADMIN_PASSWORD must be set together",
                ));
            }
        };

        Ok(Self {
            bind_addr,
            database_url: get("DATABASE_URL"),
            database_max_connections,
            jwt_secret: get("JWT_SECRET").unwrap_or(defaults.jwt_secret),
            token_ttl: Duration::minutes(ttl_minutes),
            request_number_attempts,
            post_request_movements,
            low_stock_multiplier,
            bootstrap_admin,
        })
    }

    pub fn uses_dev_secret(&self) -> bool {
        self.jwt_secret == DEV_JWT_SECRET
    }
}

fn invalid(key: &'static str, message: impl core::fmt::Display) -> ConfigError {
    ConfigError::Invalid {
        key,
        message: message.to_string(),
    }
}

fn parse_or<T>(key: &'static str, raw: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: core::str::FromStr,
    T::Err: core::fmt::Display,
{
    match raw {
        Some(v) => v.parse::<T>().map_err(|e| invalid(key, e)),
        None => Ok(default),
    }
}

fn parse_bool(key: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(invalid(key, format!("expected a boolean, got '{other}'"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(pairs: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        AppConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn empty_environment_gives_defaults() {
        let cfg = config(&[]).unwrap();
        assert_eq!(cfg, AppConfig::default());
        assert!(cfg.uses_dev_secret());
        assert!(cfg.database_url.is_none());
    }

    #[test]
    fn reads_values() {
        let cfg = config(&[
            ("BIND_ADDR", "127.0.0.1:9000"),
            ("DATABASE_URL", "postgres://localhost/flowrack"),
            ("JWT_SECRET", "s3cret"),
            ("TOKEN_TTL_MINUTES", "30"),
            ("POST_REQUEST_MOVEMENTS", "off"),
            ("LOW_STOCK_MULTIPLIER", "1.5"),
            ("BOOTSTRAP_ADMIN_REGISTRATION", "ADMIN001"),
            ("BOOTSTRAP_ADMIN_PASSWORD", "admin123"),
        ])
        .unwrap();
        assert_eq!(cfg.bind_addr.port(), 9000);
        assert_eq!(cfg.token_ttl, Duration::minutes(30));
        assert!(!cfg.post_request_movements);
        assert_eq!(cfg.low_stock_multiplier, Decimal::new(15, 1));
        assert_eq!(cfg.bootstrap_admin.as_ref().map(|a| a.registration_number.as_str()), Some("ADMIN001"));
        assert!(!format!("{cfg:?}").contains("admin123"));
        assert!(!format!("{cfg:?}").contains("s3cret"));
    }

    #[test]
    fn malformed_values_are_errors() {
        assert!(config(&[("TOKEN_TTL_MINUTES", "soon")]).is_err());
        assert!(config(&[("TOKEN_TTL_MINUTES", "0")]).is_err());
        assert!(config(&[("POST_REQUEST_MOVEMENTS", "maybe")]).is_err());
        assert!(config(&[("BIND_ADDR", "nowhere")]).is_err());
        assert!(config(&[("BOOTSTRAP_ADMIN_PASSWORD", "x")]).is_err());
    }
}
