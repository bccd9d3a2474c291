//! Session configuration parsed from environment variables.

use std::path::PathBuf;

pub const DEFAULT_API_URL: &str = "http://localhost:5000/api";
pub const DEFAULT_STATE_DIR: &str = ".walkfit";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 5;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config parse failed: {0}")]
    ConfigParse(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpTimeouts {
    pub request_secs: u64,
    pub connect_secs: u64,
}

impl Default for HttpTimeouts {
    fn default() -> Self {
        Self { request_secs: DEFAULT_REQUEST_TIMEOUT_SECS, connect_secs: DEFAULT_CONNECT_TIMEOUT_SECS }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Backend API base URL, without a trailing slash.
    pub api_url: String,
    /// Directory holding the persisted credential and picture.
    pub state_dir: PathBuf,
    pub timeouts: HttpTimeouts,
    /// Allow unverified token claims as an identity fallback when the
    /// backend cannot be reached.
    pub unverified_fallback: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_owned(),
            state_dir: PathBuf::from(DEFAULT_STATE_DIR),
            timeouts: HttpTimeouts::default(),
            unverified_fallback: true,
        }
    }
}

impl SessionConfig {
    /// Build typed session config from environment variables.
    ///
    /// Optional:
    /// - `WALKFIT_API_URL`: default `http://localhost:5000/api`
    /// - `WALKFIT_STATE_DIR`: default `.walkfit`
    /// - `WALKFIT_REQUEST_TIMEOUT_SECS`: default 10
    /// - `WALKFIT_CONNECT_TIMEOUT_SECS`: default 5
    /// - `WALKFIT_UNVERIFIED_FALLBACK`: `true` (default) or `false`
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ConfigParse`] for an unrecognized fallback flag.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup. `from_env` delegates here.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ConfigParse`] for an unrecognized fallback flag.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_url = lookup("WALKFIT_API_URL")
            .unwrap_or_else(|| DEFAULT_API_URL.to_owned())
            .trim_end_matches('/')
            .to_owned();
        let state_dir = lookup("WALKFIT_STATE_DIR").map_or_else(|| PathBuf::from(DEFAULT_STATE_DIR), PathBuf::from);
        let timeouts = HttpTimeouts {
            request_secs: parse_u64(lookup("WALKFIT_REQUEST_TIMEOUT_SECS"), DEFAULT_REQUEST_TIMEOUT_SECS),
            connect_secs: parse_u64(lookup("WALKFIT_CONNECT_TIMEOUT_SECS"), DEFAULT_CONNECT_TIMEOUT_SECS),
        };
        let unverified_fallback = parse_flag(lookup("WALKFIT_UNVERIFIED_FALLBACK").as_deref())?;

        Ok(Self { api_url, state_dir, timeouts, unverified_fallback })
    }
}

fn parse_u64(raw: Option<String>, default: u64) -> u64 {
    raw.and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(default)
}

fn parse_flag(raw: Option<&str>) -> Result<bool, ConfigError> {
    match raw.map(str::trim).unwrap_or("true") {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        other => Err(ConfigError::ConfigParse(format!(
            "unsupported WALKFIT_UNVERIFIED_FALLBACK '{other}' (expected 'true' or 'false')"
        ))),
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
