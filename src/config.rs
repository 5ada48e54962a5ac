//! Service configuration, read from the environment (and `.env` when present).

use std::env;
use std::str::FromStr;

use thiserror::Error;

const DEV_JWT_SECRET: &str = "dev-secret-change-in-production";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// # Environment variables
///
/// - `DATABASE_URL`: Postgres connection string (required)
/// - `JWT_SECRET`: secret for share-link tokens (default: a development secret)
/// - `DATABASE_MAX_CONNECTIONS`: pool size (default: 5)
/// - `RATES_URL`: endpoint serving exchange rates as JSON (optional)
/// - `BASE_CURRENCY`: currency the fallback rates are quoted against (default: `USD`)
/// - `FALLBACK_RATES`: comma separated `CODE=rate` pairs used when `RATES_URL`
///   is unset or unreachable (optional)
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub database_url: String,
    pub jwt_secret: String,
    pub max_connections: u32,
    pub rates_url: Option<String>,
    pub base_currency: String,
    pub fallback_rates: Vec<(String, f64)>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if it exists
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from any key lookup, e.g. a map in tests.
    pub fn from_lookup<L>(lookup: L) -> Result<Self, ConfigError>
    where
        L: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let database_url =
            get("DATABASE_URL").ok_or_else(|| ConfigError::MissingEnvVar("DATABASE_URL".to_string()))?;

        let jwt_secret = get("JWT_SECRET").unwrap_or_else(|| {
            tracing::warn!("JWT_SECRET is not set, using the development secret");
            DEV_JWT_SECRET.to_string()
        });

        let max_connections = match get("DATABASE_MAX_CONNECTIONS") {
            Some(raw) => parse("DATABASE_MAX_CONNECTIONS", &raw)?,
            None => 5,
        };

        let fallback_rates = match get("FALLBACK_RATES") {
            Some(raw) => parse_rate_list("FALLBACK_RATES", &raw)?,
            None => Vec::new(),
        };

        Ok(AppConfig {
            database_url,
            jwt_secret,
            max_connections,
            rates_url: get("RATES_URL"),
            base_currency: get("BASE_CURRENCY")
                .map(|code| code.trim().to_ascii_uppercase())
                .unwrap_or_else(|| "USD".to_string()),
            fallback_rates,
        })
    }
}

fn parse<T>(key: &str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
        key: key.to_string(),
        message: e.to_string(),
    })
}

/// Parses `EUR=0.92,GBP=0.79` into code/rate pairs.
pub fn parse_rate_list(key: &str, raw: &str) -> Result<Vec<(String, f64)>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let (code, rate) = entry.split_once('=').ok_or_else(|| ConfigError::InvalidValue {
                key: key.to_string(),
                message: format!("expected CODE=rate, got {entry:?}"),
            })?;
            let rate: f64 = parse(key, rate)?;
            if !rate.is_finite() || rate <= 0.0 {
                return Err(ConfigError::InvalidValue {
                    key: key.to_string(),
                    message: format!("rate for {} must be positive", code.trim()),
                });
            }
            Ok((code.trim().to_ascii_uppercase(), rate))
        })
        .collect()
}
