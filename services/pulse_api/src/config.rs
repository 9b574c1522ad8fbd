//! services/pulse_api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::str::FromStr;
use tracing::Level;

use pulse_core::EchoPolicy;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Where messages and user profiles are persisted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StorageBackend {
    Postgres,
    /// Process-local storage; everything is lost on restart.
    Memory,
}

impl FromStr for StorageBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "postgres" => Ok(StorageBackend::Postgres),
            "memory" => Ok(StorageBackend::Memory),
            other => Err(format!("'{}' is not one of: postgres, memory", other)),
        }
    }
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub storage_backend: StorageBackend,
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    pub log_level: Level,
    pub cors_origin: String,
    pub echo_policy: EchoPolicy,
    pub notifications_enabled: bool,
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
        Self::from_vars(std::env::vars().collect())
    }

    /// Builds the configuration from an explicit set of variables.
    pub fn from_vars(vars: HashMap<String, String>) -> Result<Self, ConfigError> {
        let var = |name: &str| vars.get(name).cloned();

        // --- Server ---
        let bind_address_str = var("BIND_ADDRESS").unwrap_or_else(|| "0.0.0.0:5000".to_string());
        let bind_address = bind_address_str.parse::<SocketAddr>().map_err(|e| {
            ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string())
        })?;

        let cors_origin =
            var("CORS_ORIGIN").unwrap_or_else(|| "http://localhost:5173".to_string());

        let log_level_str = var("RUST_LOG").unwrap_or_else(|| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        // --- Storage ---
        let storage_backend = match var("STORAGE_BACKEND") {
            Some(raw) => raw
                .parse::<StorageBackend>()
                .map_err(|e| ConfigError::InvalidValue("STORAGE_BACKEND".to_string(), e))?,
            None => StorageBackend::Postgres,
        };

        let database_url = var("DATABASE_URL");
        if storage_backend == StorageBackend::Postgres && database_url.is_none() {
            return Err(ConfigError::MissingVar("DATABASE_URL".to_string()));
        }

        let db_max_connections = match var("DB_MAX_CONNECTIONS") {
            Some(raw) => raw.parse::<u32>().map_err(|e| {
                ConfigError::InvalidValue("DB_MAX_CONNECTIONS".to_string(), e.to_string())
            })?,
            None => 5,
        };

        // --- Messaging behaviour ---
        let echo_policy = if parse_flag(&vars, "ECHO_TO_ALL_SENDER_SESSIONS", false)? {
            EchoPolicy::AllSenderSessions
        } else {
            EchoPolicy::OriginOnly
        };
        let notifications_enabled = parse_flag(&vars, "NOTIFICATIONS_ENABLED", true)?;

        Ok(Self {
            bind_address,
            storage_backend,
            database_url,
            db_max_connections,
            log_level,
            cors_origin,
            echo_policy,
            notifications_enabled,
        })
    }
}

fn parse_flag(vars: &HashMap<String, String>, name: &str, default: bool) -> Result<bool, ConfigError> {
    match vars.get(name).map(|v| v.trim().to_ascii_lowercase()) {
        None => Ok(default),
        Some(v) => match v.as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::InvalidValue(
                name.to_string(),
                format!("'{}' is not a boolean", v),
            )),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn defaults_apply_with_database_url() {
        let config = Config::from_vars(vars(&[("DATABASE_URL", "postgres://localhost/pulse")])).unwrap();
        assert_eq!(config.bind_address.port(), 5000);
        assert_eq!(config.storage_backend, StorageBackend::Postgres);
        assert_eq!(config.db_max_connections, 5);
        assert_eq!(config.log_level, Level::INFO);
        assert_eq!(config.echo_policy, EchoPolicy::OriginOnly);
        assert!(config.notifications_enabled);
    }

    #[test]
    fn postgres_requires_database_url() {
        let err = Config::from_vars(HashMap::new()).unwrap_err();
        assert_eq!(err, ConfigError::MissingVar("DATABASE_URL".to_string()));
    }

    #[test]
    fn memory_backend_needs_no_database() {
        let config = Config::from_vars(vars(&[("STORAGE_BACKEND", "memory")])).unwrap();
        assert_eq!(config.storage_backend, StorageBackend::Memory);
        assert!(config.database_url.is_none());
    }

    #[test]
    fn echo_flag_switches_policy() {
        let config = Config::from_vars(vars(&[
            ("STORAGE_BACKEND", "memory"),
            ("ECHO_TO_ALL_SENDER_SESSIONS", "true"),
            ("NOTIFICATIONS_ENABLED", "off"),
        ]))
        .unwrap();
        assert_eq!(config.echo_policy, EchoPolicy::AllSenderSessions);
        assert!(!config.notifications_enabled);
    }

    #[test]
    fn invalid_values_are_reported() {
        let err = Config::from_vars(vars(&[("STORAGE_BACKEND", "memory"), ("BIND_ADDRESS", "nope")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(name, _) if name == "BIND_ADDRESS"));

        let err = Config::from_vars(vars(&[("STORAGE_BACKEND", "sqlite")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(name, _) if name == "STORAGE_BACKEND"));

        let err = Config::from_vars(vars(&[("STORAGE_BACKEND", "memory"), ("NOTIFICATIONS_ENABLED", "maybe")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(name, _) if name == "NOTIFICATIONS_ENABLED"));
    }
}
