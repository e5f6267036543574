use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;
use url::Url;

use super::basic::{default_backoff_initial_ms, default_backoff_max_ms};
use crate::error::RelayError;

/// Connection to the paginated log API.
///
/// Only `api_url`, `client_id` and `client_secret` identify the connection; changing any of
/// them invalidates previously saved state.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SourceConfig {
    /// Base API URL; the OAuth endpoints live under `/auth`.
    /// TOML: `source.api_url`. Default: `https://dashboard.bugfender.com`.
    #[serde(default = "default_api_url")]
    pub api_url: Url,

    /// OAuth client id (mandatory).
    /// TOML: `source.client_id`.
    #[serde(default, deserialize_with = "deserialize_string_lax")]
    pub client_id: String,

    /// OAuth client secret (mandatory).
    /// TOML: `source.client_secret`.
    #[serde(default, deserialize_with = "deserialize_string_lax")]
    pub client_secret: String,

    /// Application whose logs are relayed (mandatory, non-zero).
    /// TOML: `source.app_id`.
    #[serde(default)]
    pub app_id: i64,

    /// Records per page requested on a cold start.
    /// TOML: `source.page_size`. Default: `10000`.
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// First wait while the source has no new data, in milliseconds.
    /// TOML: `source.poll_backoff_initial_ms`. Default: `5000`.
    #[serde(default = "default_backoff_initial_ms")]
    pub poll_backoff_initial_ms: u64,

    /// Upper bound for the no-new-data wait, in milliseconds.
    /// TOML: `source.poll_backoff_max_ms`. Default: `300000`.
    #[serde(default = "default_backoff_max_ms")]
    pub poll_backoff_max_ms: u64,

    /// Per-request timeout for page fetches.
    /// TOML: `source.request_timeout_secs`. Default: `60`.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Skip TLS certificate verification (insecure).
    /// TOML: `source.insecure_skip_tls_verify`. Default: `false`.
    #[serde(default)]
    pub insecure_skip_tls_verify: bool,

    /// Local address for the interactive login callback listener.
    /// TOML: `source.callback_addr`. Default: `127.0.0.1:0` (any free port).
    #[serde(default = "default_callback_addr")]
    pub callback_addr: SocketAddr,

    /// Try to open the authorization URL in a browser during interactive login.
    /// TOML: `source.open_browser`. Default: `true`.
    #[serde(default = "default_open_browser")]
    pub open_browser: bool,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            client_id: String::new(),
            client_secret: String::new(),
            app_id: 0,
            page_size: default_page_size(),
            poll_backoff_initial_ms: default_backoff_initial_ms(),
            poll_backoff_max_ms: default_backoff_max_ms(),
            request_timeout_secs: default_request_timeout_secs(),
            insecure_skip_tls_verify: false,
            callback_addr: default_callback_addr(),
            open_browser: default_open_browser(),
        }
    }
}

impl SourceConfig {
    pub(super) fn validate(&self) -> Result<(), RelayError> {
        let mut missing = Vec::new();
        if self.client_id.trim().is_empty() {
            missing.push("source.client_id");
        }
        if self.client_secret.trim().is_empty() {
            missing.push("source.client_secret");
        }
        if self.app_id == 0 {
            missing.push("source.app_id");
        }
        if !missing.is_empty() {
            return Err(RelayError::Configuration(format!(
                "mandatory settings missing: {}",
                missing.join(", ")
            )));
        }
        if self.page_size == 0 {
            return Err(RelayError::Configuration(
                "source.page_size must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn poll_backoff(&self) -> (Duration, Duration) {
        (
            Duration::from_millis(self.poll_backoff_initial_ms),
            Duration::from_millis(self.poll_backoff_max_ms),
        )
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn deserialize_string_lax<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let v = Value::deserialize(deserializer)?;

    match v {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        _ => Err(serde::de::Error::custom(
            "expected a string or a number for an OAuth client setting",
        )),
    }
}

fn default_api_url() -> Url {
    Url::parse("https://dashboard.bugfender.com").expect("default api_url must be a valid URL")
}

fn default_page_size() -> u32 {
    10_000
}

fn default_request_timeout_secs() -> u64 {
    60
}

fn default_callback_addr() -> SocketAddr {
    SocketAddr::from((Ipv4Addr::LOCALHOST, 0))
}

fn default_open_browser() -> bool {
    true
}
