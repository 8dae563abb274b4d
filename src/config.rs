//! Client configuration parsed from environment variables.

#[cfg(test)]
#[path = "config_test.rs"]
mod config_test;

use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:3000";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
const STORAGE_DIR: &str = ".movierec";
const STORAGE_FILE: &str = "session.json";

/// Errors produced while building a [`ClientConfig`].
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    /// The base URL is not an absolute `http`/`https` URL.
    #[error("invalid base URL: {0}")]
    InvalidBaseUrl(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpTimeouts {
    pub request_secs: u64,
    pub connect_secs: u64,
}

impl HttpTimeouts {
    #[must_use]
    pub fn request(&self) -> Duration {
        Duration::from_secs(self.request_secs)
    }

    #[must_use]
    pub fn connect(&self) -> Duration {
        Duration::from_secs(self.connect_secs)
    }
}

impl Default for HttpTimeouts {
    fn default() -> Self {
        Self { request_secs: DEFAULT_REQUEST_TIMEOUT_SECS, connect_secs: DEFAULT_CONNECT_TIMEOUT_SECS }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// API origin without a trailing slash, e.g. `http://127.0.0.1:3000`.
    pub base_url: String,
    /// Location of the durable session store.
    pub storage_path: PathBuf,
    pub timeouts: HttpTimeouts,
}

impl ClientConfig {
    /// Build typed client config from environment variables.
    ///
    /// Optional:
    /// - `MOVIEREC_BASE_URL`: default `http://127.0.0.1:3000`
    /// - `MOVIEREC_STORAGE_PATH`: default `$HOME/.movierec/session.json`
    /// - `MOVIEREC_REQUEST_TIMEOUT_SECS`: default 30
    /// - `MOVIEREC_CONNECT_TIMEOUT_SECS`: default 10
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL is malformed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL is malformed.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let base_url = parse_base_url(lookup("MOVIEREC_BASE_URL").as_deref().unwrap_or(DEFAULT_BASE_URL))?;
        let storage_path = lookup("MOVIEREC_STORAGE_PATH")
            .filter(|p| !p.trim().is_empty())
            .map_or_else(|| default_storage_path(lookup("HOME").as_deref()), PathBuf::from);
        let timeouts = HttpTimeouts {
            request_secs: parse_secs(lookup("MOVIEREC_REQUEST_TIMEOUT_SECS"), DEFAULT_REQUEST_TIMEOUT_SECS),
            connect_secs: parse_secs(lookup("MOVIEREC_CONNECT_TIMEOUT_SECS"), DEFAULT_CONNECT_TIMEOUT_SECS),
        };

        Ok(Self { base_url, storage_path, timeouts })
    }
}

/// Validate and normalize an API origin.
///
/// # Errors
///
/// Returns an error unless `raw` is an absolute `http`/`https` URL.
pub fn parse_base_url(raw: &str) -> Result<String, ConfigError> {
    let trimmed = raw.trim().trim_end_matches('/');
    let url = reqwest::Url::parse(trimmed).map_err(|e| ConfigError::InvalidBaseUrl(format!("{trimmed}: {e}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidBaseUrl(format!("{trimmed}: unsupported scheme {}", url.scheme())));
    }
    Ok(trimmed.to_owned())
}

fn parse_secs(raw: Option<String>, default: u64) -> u64 {
    raw.and_then(|v| v.trim().parse::<u64>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(default)
}

fn default_storage_path(home: Option<&str>) -> PathBuf {
    let root = home.filter(|h| !h.is_empty()).map_or_else(|| PathBuf::from("."), PathBuf::from);
    root.join(STORAGE_DIR).join(STORAGE_FILE)
}
