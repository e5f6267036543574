use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Process-level configuration managed by Figment.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BasicConfig {
    /// Log level for tracing subscriber initialization (e.g., "error", "warn", "info", "debug", "trace").
    /// TOML: `basic.loglevel`. Default: `info`.
    #[serde(default = "default_loglevel")]
    pub loglevel: String,

    /// File to restore and save the sync state from, so a restart resumes where it stopped.
    /// TOML: `basic.state_file`. Default: unset (no resumption).
    #[serde(default)]
    pub state_file: Option<PathBuf>,

    /// Seconds between periodic state checkpoints.
    /// TOML: `basic.checkpoint_interval_secs`. Default: `300`.
    #[serde(default = "default_checkpoint_interval_secs")]
    pub checkpoint_interval_secs: u64,

    /// Consecutive failed fetch/write cycles before giving up. `0` retries forever.
    /// TOML: `basic.max_consecutive_failures`. Default: `10`.
    #[serde(default = "default_max_consecutive_failures")]
    pub max_consecutive_failures: u32,

    /// First delay after a failed cycle, in milliseconds.
    /// TOML: `basic.retry_backoff_initial_ms`. Default: `5000`.
    #[serde(default = "default_backoff_initial_ms")]
    pub retry_backoff_initial_ms: u64,

    /// Upper bound for the failed-cycle delay, in milliseconds.
    /// TOML: `basic.retry_backoff_max_ms`. Default: `300000`.
    #[serde(default = "default_backoff_max_ms")]
    pub retry_backoff_max_ms: u64,
}

impl Default for BasicConfig {
    fn default() -> Self {
        Self {
            loglevel: default_loglevel(),
            state_file: None,
            checkpoint_interval_secs: default_checkpoint_interval_secs(),
            max_consecutive_failures: default_max_consecutive_failures(),
            retry_backoff_initial_ms: default_backoff_initial_ms(),
            retry_backoff_max_ms: default_backoff_max_ms(),
        }
    }
}

impl BasicConfig {
    pub fn checkpoint_interval(&self) -> Duration {
        Duration::from_secs(self.checkpoint_interval_secs)
    }

    pub fn retry_backoff(&self) -> (Duration, Duration) {
        (
            Duration::from_millis(self.retry_backoff_initial_ms),
            Duration::from_millis(self.retry_backoff_max_ms),
        )
    }
}

fn default_loglevel() -> String {
    "info".to_string()
}

fn default_checkpoint_interval_secs() -> u64 {
    300
}

fn default_max_consecutive_failures() -> u32 {
    10
}

pub(super) fn default_backoff_initial_ms() -> u64 {
    5_000
}

pub(super) fn default_backoff_max_ms() -> u64 {
    300_000
}
