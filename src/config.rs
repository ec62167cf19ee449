//! Application Configuration
//!
//! Read once at startup from the process environment (after `.env` is
//! loaded). Scheduler settings live in the database instead.

use crate::mail::gmail::GMAIL_API_BASE;
use crate::oauth::{OAuthClientConfig, OAuthClients, GOOGLE_TOKEN_URL};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:8787";
pub const DEFAULT_PROVIDER_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required setting {0}")]
    Missing(&'static str),

    #[error("Invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },

    #[error("Failed to determine data directory")]
    NoDataDir,
}

/// Runtime configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_path: PathBuf,
    pub listen_addr: SocketAddr,
    /// Non-privileged credential identifying scheduler-triggered calls
    pub scheduler_key: String,
    pub gmail_api_base: String,
    pub oauth: OAuthClients,
    pub provider_timeout: Duration,
}

impl AppConfig {
    /// Load from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let database_path = match get("MAILSYNC_DATABASE_PATH") {
            Some(path) => PathBuf::from(path),
            None => default_database_path()?,
        };

        let listen_addr = get("MAILSYNC_LISTEN_ADDR")
            .unwrap_or_else(|| DEFAULT_LISTEN_ADDR.to_string())
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::Invalid {
                name: "MAILSYNC_LISTEN_ADDR",
                reason: e.to_string(),
            })?;

        let scheduler_key = get("MAILSYNC_SCHEDULER_KEY").ok_or(ConfigError::Missing("MAILSYNC_SCHEDULER_KEY"))?;

        let gmail_api_base = validate_url(
            "GMAIL_API_BASE",
            get("GMAIL_API_BASE").unwrap_or_else(|| GMAIL_API_BASE.to_string()),
        )?;
        let token_url = validate_url(
            "GOOGLE_TOKEN_URL",
            get("GOOGLE_TOKEN_URL").unwrap_or_else(|| GOOGLE_TOKEN_URL.to_string()),
        )?;

        let client = |id_var: &str, secret_var: &str| {
            match (get(id_var), get(secret_var)) {
                (Some(id), Some(secret)) => {
                    Some(OAuthClientConfig::google(id, secret).with_token_url(token_url.clone()))
                }
                _ => None,
            }
        };

        let oauth = OAuthClients {
            personal: client("GOOGLE_CLIENT_ID", "GOOGLE_CLIENT_SECRET"),
            workspace: client("GOOGLE_WORKSPACE_CLIENT_ID", "GOOGLE_WORKSPACE_CLIENT_SECRET"),
        };

        let timeout_secs = match get("MAILSYNC_PROVIDER_TIMEOUT_SECS") {
            Some(value) => value
                .parse::<u64>()
                .ok()
                .filter(|secs| *secs > 0)
                .ok_or_else(|| ConfigError::Invalid {
                    name: "MAILSYNC_PROVIDER_TIMEOUT_SECS",
                    reason: format!("expected a positive number of seconds, got '{}'", value),
                })?,
            None => DEFAULT_PROVIDER_TIMEOUT_SECS,
        };

        Ok(Self {
            database_path,
            listen_addr,
            scheduler_key,
            gmail_api_base,
            oauth,
            provider_timeout: Duration::from_secs(timeout_secs),
        })
    }
}

fn default_database_path() -> Result<PathBuf, ConfigError> {
    let dirs = directories::ProjectDirs::from("com", "pipeline", "mail-sync").ok_or(ConfigError::NoDataDir)?;
    Ok(dirs.data_dir().join("mailsync.db"))
}

fn validate_url(name: &'static str, value: String) -> Result<String, ConfigError> {
    let parsed = url::Url::parse(&value).map_err(|e| ConfigError::Invalid {
        name,
        reason: e.to_string(),
    })?;

    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(ConfigError::Invalid {
            name,
            reason: format!("unsupported scheme '{}'", parsed.scheme()),
        });
    }

    Ok(value.trim_end_matches('/').to_string())
}
