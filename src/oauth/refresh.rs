use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::credential::{Credential, TokenSource};
use super::endpoints::SourceOauthEndpoints;
use crate::error::OauthError;

/// Token source that reuses the cached access token until it expires and then redeems the
/// refresh token for a new one.
///
/// Refreshes are serialized so concurrent callers never redeem the same refresh token twice.
pub struct RefreshingTokenSource {
    endpoints: SourceOauthEndpoints,
    http: reqwest::Client,
    cached: Mutex<Credential>,
}

impl RefreshingTokenSource {
    pub fn new(endpoints: SourceOauthEndpoints, http: reqwest::Client, initial: Credential) -> Self {
        Self {
            endpoints,
            http,
            cached: Mutex::new(initial),
        }
    }
}

#[async_trait]
impl TokenSource for RefreshingTokenSource {
    async fn token(&self) -> Result<Credential, OauthError> {
        let mut cached = self.cached.lock().await;
        if cached.is_valid() {
            return Ok(cached.clone());
        }

        let refresh_token = cached
            .refresh_token()
            .map(str::to_string)
            .ok_or(OauthError::MissingRefreshToken)?;
        debug!("Access token missing or expired, refreshing");

        let resp = self
            .endpoints
            .refresh_access_token(&refresh_token, &self.http)
            .await?;
        let fresh = Credential::from_token_response(&resp, Some(&refresh_token));
        info!(
            expiry = ?fresh.expiry(),
            rotated = fresh.refresh_token() != Some(refresh_token.as_str()),
            "OAuth access token refreshed"
        );

        *cached = fresh.clone();
        Ok(fresh)
    }
}
