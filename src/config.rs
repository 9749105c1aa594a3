//! Bot configuration from the environment

use crate::commerce::credentials::DEFAULT_SAFETY_MARGIN;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_STORE_API_URL: &str = "https://api.moltin.com";
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required environment variable {0}")]
    Missing(&'static str),
    #[error("Invalid value for {name}: {value:?}")]
    Invalid { name: &'static str, value: String },
}

/// Everything the bot needs to start
#[derive(Debug, Clone)]
pub struct BotConfig {
    pub telegram_token: String,
    pub store_client_id: String,
    pub store_api_url: String,
    /// Bound on every backend call
    pub http_timeout: Duration,
    /// Subtracted from the reported token lifetime
    pub token_margin: Duration,
    pub session_db_path: PathBuf,
}

impl BotConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from any variable source; empty values count as unset
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let required = |name: &'static str| get(name).ok_or(ConfigError::Missing(name));

        let seconds = |name: &'static str, default: u64| -> Result<Duration, ConfigError> {
            match get(name) {
                None => Ok(Duration::from_secs(default)),
                Some(value) => value
                    .trim()
                    .parse()
                    .map(Duration::from_secs)
                    .map_err(|_| ConfigError::Invalid { name, value }),
            }
        };

        let http_timeout = seconds("STORE_HTTP_TIMEOUT_SECS", DEFAULT_HTTP_TIMEOUT_SECS)?;
        if http_timeout.is_zero() {
            return Err(ConfigError::Invalid {
                name: "STORE_HTTP_TIMEOUT_SECS",
                value: "0".to_string(),
            });
        }

        let session_db_path = get("SESSION_DB_PATH").map_or_else(
            || {
                let home = get("HOME").unwrap_or_else(|| "/tmp".to_string());
                PathBuf::from(home).join(".shop-bot").join("sessions.db")
            },
            PathBuf::from,
        );

        Ok(Self {
            telegram_token: required("TELEGRAM_TOKEN")?,
            store_client_id: required("STORE_CLIENT_ID")?,
            store_api_url: get("STORE_API_URL").map_or_else(
                || DEFAULT_STORE_API_URL.to_string(),
                |url| url.trim_end_matches('/').to_string(),
            ),
            http_timeout,
            token_margin: seconds("STORE_TOKEN_MARGIN_SECS", DEFAULT_SAFETY_MARGIN.as_secs())?,
            session_db_path,
        })
    }
}
