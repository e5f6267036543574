use std::sync::Arc;
use url::Url;

use crate::error::RelayError;
use crate::oauth::TokenSource;

/// HTTP client that authenticates every request with the current bearer token.
///
/// Tokens come from `tokens`, which refreshes them transparently; a failed refresh surfaces as
/// [`RelayError::Authentication`].
pub struct AuthorizedTransport<S> {
    http: reqwest::Client,
    tokens: Arc<S>,
}

impl<S: TokenSource> AuthorizedTransport<S> {
    pub fn new(http: reqwest::Client, tokens: Arc<S>) -> Self {
        Self { http, tokens }
    }

    pub fn tokens(&self) -> &S {
        &self.tokens
    }

    pub async fn get(&self, url: &Url) -> Result<reqwest::Response, RelayError> {
        let credential = self.tokens.token().await?;
        let resp = self
            .http
            .get(url.clone())
            .bearer_auth(credential.access_token())
            .send()
            .await?;
        Ok(resp)
    }
}
