//! Environment variable names used by this crate for convenient
//! configuration of handlers from services.
//!
//! These are purely helpers; the handler and client types remain
//! decoupled from environment access.

use crate::handler::HandlerOptions;
use tracing::Level;

/// Project that owns the logs.
pub const CLOUD_LOGGING_PROJECT_ENV: &str = "GOOGLE_CLOUD_PROJECT";

/// OAuth2 access token used as bearer credentials.
pub const CLOUD_LOGGING_ACCESS_TOKEN_ENV: &str = "GOOGLE_CLOUD_ACCESS_TOKEN";

/// Optional API base URL, e.g. for an emulator.
pub const CLOUD_LOGGING_ENDPOINT_ENV: &str = "CLOUD_LOGGING_ENDPOINT";

/// Log name entries are written under.
pub const CLOUD_LOG_NAME_ENV: &str = "CLOUD_LOG_NAME";

/// Minimum level, one of `trace`, `debug`, `info`, `warn`, `error`.
pub const CLOUD_LOG_LEVEL_ENV: &str = "CLOUD_LOG_LEVEL";

pub const DEFAULT_LOG_NAME: &str = "app";

/// Read an environment variable or fall back to a provided default.
pub fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Log name from [`CLOUD_LOG_NAME_ENV`], or [`DEFAULT_LOG_NAME`].
pub fn log_name() -> String {
    env_or(CLOUD_LOG_NAME_ENV, DEFAULT_LOG_NAME)
}

/// Parse a level name as accepted in [`CLOUD_LOG_LEVEL_ENV`].
pub fn parse_level(value: &str) -> Result<Level, ConfigError> {
    value
        .trim()
        .parse::<Level>()
        .map_err(|_| ConfigError::InvalidLevel(value.to_string()))
}

impl HandlerOptions {
    /// Options from [`CLOUD_LOG_LEVEL_ENV`], defaulting to `INFO`.
    pub fn from_env() -> Result<Self, ConfigError> {
        match std::env::var(CLOUD_LOG_LEVEL_ENV) {
            Ok(value) => Ok(Self {
                level: parse_level(&value)?,
            }),
            Err(_) => Ok(Self::default()),
        }
    }
}

/// Error type returned when reading configuration from the environment.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("environment variable {0} is not set")]
    Missing(&'static str),

    #[error("invalid log level: {0:?}")]
    InvalidLevel(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_level_names() {
        assert_eq!(parse_level("warn").unwrap(), Level::WARN);
        assert_eq!(parse_level(" DEBUG ").unwrap(), Level::DEBUG);
        assert!(matches!(
            parse_level("loud"),
            Err(ConfigError::InvalidLevel(v)) if v == "loud"
        ));
    }

    #[test]
    fn env_or_falls_back() {
        assert_eq!(env_or("TRACING_CLOUD_LOGGING_UNSET_VAR", "x"), "x");
    }
}
