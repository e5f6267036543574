use reqwest::StatusCode;
use std::path::PathBuf;
use thiserror::Error as ThisError;

use super::IsRetryable;
use super::oauth::OauthError;
use super::sink::SinkError;

#[derive(Debug, ThisError)]
pub enum RelayError {
    /// Missing or invalid settings; fatal at startup.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Login or token refresh failure.
    #[error(transparent)]
    Authentication(#[from] OauthError),

    #[error("HTTP request error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("unexpected status code: {status}. response was: {body:.200}")]
    UpstreamStatus { status: StatusCode, body: String },

    #[error("parsing response: {message}. response was: {body:.200}")]
    MalformedPage { message: String, body: String },

    #[error(transparent)]
    Sink(#[from] SinkError),

    #[error("error saving state file {}: {source}", path.display())]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("encoding sync state: {0}")]
    StateEncoding(#[from] serde_json::Error),

    /// Shutdown was requested. Not a failure.
    #[error("operation cancelled")]
    Cancelled,
}

impl RelayError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, RelayError::Cancelled)
    }
}

impl IsRetryable for RelayError {
    /// Mid-stream failures are retried by the sync engine; startup and persistence failures
    /// are not.
    fn is_retryable(&self) -> bool {
        match self {
            RelayError::Authentication(_)
            | RelayError::Transport(_)
            | RelayError::UpstreamStatus { .. }
            | RelayError::MalformedPage { .. }
            | RelayError::Sink(_) => true,
            RelayError::Configuration(_)
            | RelayError::Persistence { .. }
            | RelayError::StateEncoding(_)
            | RelayError::Cancelled => false,
        }
    }
}
