use reqwest::StatusCode;
use thiserror::Error as ThisError;
use uuid::Uuid;

use super::IsRetryable;

#[derive(Debug, ThisError)]
pub enum SinkError {
    /// Transport-level failure talking to the bulk endpoint.
    #[error("bulk request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("bulk request rejected with status {status}: {body:.200}")]
    Status { status: StatusCode, body: String },

    #[error("encoding document {id}: {source}")]
    Encode {
        id: Uuid,
        #[source]
        source: serde_json::Error,
    },

    #[error("bulk response parse error: {0}")]
    Response(#[source] serde_json::Error),

    #[error("no bulk index nodes configured")]
    NoNodes,
}

impl IsRetryable for SinkError {
    fn is_retryable(&self) -> bool {
        match self {
            SinkError::Request(_) => true,
            SinkError::Status { status, .. } => matches!(
                *status,
                StatusCode::TOO_MANY_REQUESTS
                    | StatusCode::BAD_GATEWAY
                    | StatusCode::SERVICE_UNAVAILABLE
                    | StatusCode::GATEWAY_TIMEOUT
            ),
            _ => false,
        }
    }
}
