//! Startup configuration read from the environment.

use std::time::Duration;

use axum::http::HeaderValue;
use jovey_projector::application::command_handlers::{
    DEFAULT_HANDLER_TIMEOUT, DEFAULT_MAX_ATTEMPTS, ProjectorSettings,
};

use crate::error::AppError;

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_MAX_CONNECTIONS: u32 = 10;
const DEFAULT_CORS_ORIGINS: &str = "http://localhost:3000,http://localhost:5173";

/// Server configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Postgres connection string.
    pub database_url: String,
    /// Bind address.
    pub host: String,
    /// Bind port.
    pub port: u16,
    /// HS256 secret for bearer tokens.
    pub jwt_secret: String,
    /// Pool size.
    pub database_max_connections: u32,
    /// Database Manager tunables.
    pub projector: ProjectorSettings,
    /// Origins allowed by CORS.
    pub cors_origins: Vec<HeaderValue>,
    /// OTLP collector endpoint; tracing export is off when unset.
    pub otlp_endpoint: Option<String>,
}

impl Config {
    /// Reads the configuration from process environment variables.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if a required variable is missing or a
    /// value does not parse.
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads the configuration through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if a required variable is missing or a
    /// value does not parse.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let required = |key: &str| {
            lookup(key)
                .filter(|v| !v.is_empty())
                .ok_or_else(|| AppError::Config(format!("{key} environment variable must be set")))
        };

        let max_attempts = parse_or(&lookup, "PROJECTOR_MAX_ATTEMPTS", DEFAULT_MAX_ATTEMPTS)?;
        if max_attempts < 1 {
            return Err(AppError::Config(
                "PROJECTOR_MAX_ATTEMPTS must be at least 1".into(),
            ));
        }
        let timeout_ms = parse_or(
            &lookup,
            "PROJECTOR_HANDLER_TIMEOUT_MS",
            u64::try_from(DEFAULT_HANDLER_TIMEOUT.as_millis()).unwrap_or(u64::MAX),
        )?;

        Ok(Self {
            database_url: required("DATABASE_URL")?,
            host: lookup("HOST").unwrap_or_else(|| DEFAULT_HOST.to_owned()),
            port: parse_or(&lookup, "PORT", DEFAULT_PORT)?,
            jwt_secret: required("JWT_SECRET")?,
            database_max_connections: parse_or(
                &lookup,
                "DATABASE_MAX_CONNECTIONS",
                DEFAULT_MAX_CONNECTIONS,
            )?,
            projector: ProjectorSettings {
                max_attempts,
                handler_timeout: Duration::from_millis(timeout_ms),
            },
            cors_origins: cors_origins(
                &lookup("CORS_ORIGINS").unwrap_or_else(|| DEFAULT_CORS_ORIGINS.to_owned()),
            )?,
            otlp_endpoint: lookup("OTEL_EXPORTER_OTLP_ENDPOINT").filter(|v| !v.is_empty()),
        })
    }
}

fn parse_or<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| AppError::Config(format!("{key} is invalid ({raw:?}): {e}"))),
    }
}

fn cors_origins(raw: &str) -> Result<Vec<HeaderValue>, AppError> {
    raw.split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .map(|origin| {
            HeaderValue::from_str(origin)
                .map_err(|e| AppError::Config(format!("invalid CORS origin {origin:?}: {e}")))
        })
        .collect()
}
