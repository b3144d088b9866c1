//! Client configuration parsed from environment variables.

use std::time::Duration;

use crate::page::DEFAULT_PAGE_SIZE;

pub const DEFAULT_API_URL: &str = "http://localhost:8000";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_FETCH_RETRIES: u32 = 3;
pub const DEFAULT_REDIRECT_DELAY_MS: u64 = 1000;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("{var} must be greater than zero")]
    Zero { var: &'static str },
    #[error("invalid API base URL '{0}'")]
    InvalidUrl(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Backend origin without trailing slash.
    pub api_url: String,
    pub api_token: Option<String>,
    pub page_size: u32,
    pub request_timeout: Duration,
    /// Extra attempts for failed list reads. Commands never retry.
    pub fetch_retries: u32,
    /// Pause before leaving the app for an external payment URL.
    pub redirect_delay: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_owned(),
            api_token: None,
            page_size: DEFAULT_PAGE_SIZE,
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            fetch_retries: DEFAULT_FETCH_RETRIES,
            redirect_delay: Duration::from_millis(DEFAULT_REDIRECT_DELAY_MS),
        }
    }
}

impl ClientConfig {
    /// Build typed config from environment variables.
    ///
    /// Optional:
    /// - `PLANDESK_API_URL`: default `http://localhost:8000`
    /// - `PLANDESK_API_TOKEN`: bearer token, unset means anonymous
    /// - `PLANDESK_PAGE_SIZE`: default 10, zero is rejected
    /// - `PLANDESK_REQUEST_TIMEOUT_SECS`: default 30
    /// - `PLANDESK_FETCH_RETRIES`: default 3
    /// - `PLANDESK_REDIRECT_DELAY_MS`: default 1000
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for a zero page size or a base URL that is not
    /// `http(s)://...`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_url = std::env::var("PLANDESK_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.to_owned());
        let api_token = std::env::var("PLANDESK_API_TOKEN")
            .ok()
            .map(|token| token.trim().to_owned())
            .filter(|token| !token.is_empty());

        let page_size = env_parse("PLANDESK_PAGE_SIZE", DEFAULT_PAGE_SIZE);
        if page_size == 0 {
            return Err(ConfigError::Zero { var: "PLANDESK_PAGE_SIZE" });
        }

        Ok(Self {
            api_url: normalize_api_url(&api_url)?,
            api_token,
            page_size,
            request_timeout: Duration::from_secs(env_parse(
                "PLANDESK_REQUEST_TIMEOUT_SECS",
                DEFAULT_REQUEST_TIMEOUT_SECS,
            )),
            fetch_retries: env_parse("PLANDESK_FETCH_RETRIES", DEFAULT_FETCH_RETRIES),
            redirect_delay: Duration::from_millis(env_parse("PLANDESK_REDIRECT_DELAY_MS", DEFAULT_REDIRECT_DELAY_MS)),
        })
    }
}

/// Trim whitespace and trailing slashes; require an http(s) scheme.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidUrl`] when the scheme is missing.
pub fn normalize_api_url(raw: &str) -> Result<String, ConfigError> {
    let trimmed = raw.trim().trim_end_matches('/');
    if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
        return Err(ConfigError::InvalidUrl(raw.to_owned()));
    }
    Ok(trimmed.to_owned())
}

fn env_parse<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
