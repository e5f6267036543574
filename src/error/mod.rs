mod oauth;
mod relay;
mod sink;

pub use oauth::OauthError;
pub use relay::RelayError;
pub use sink::SinkError;

pub trait IsRetryable {
    fn is_retryable(&self) -> bool;
}
