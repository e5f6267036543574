use std::sync::Arc;
use tracing::{info, warn};

use super::browser::InteractiveLogin;
use super::credential::{Credential, TokenSource};
use super::endpoints::SourceOauthEndpoints;
use super::refresh::RefreshingTokenSource;
use super::sniffer::TokenSniffer;
use crate::error::OauthError;

/// Credential provider handed to the source transport.
pub type SourceTokens = TokenSniffer<RefreshingTokenSource>;

/// Logs in, reusing `refresh_token` silently when possible.
///
/// Falls back to `interactive` when there is no refresh token or the server rejects it.
pub async fn login(
    endpoints: &SourceOauthEndpoints,
    http: &reqwest::Client,
    refresh_token: Option<String>,
    interactive: &dyn InteractiveLogin,
) -> Result<Arc<SourceTokens>, OauthError> {
    let initial = Credential::from_refresh_token(refresh_token);
    let tokens = sniffing_source(endpoints, http, initial);

    match tokens.token().await {
        Ok(_) => {
            info!("Logged in with saved refresh token");
            return Ok(Arc::new(tokens));
        }
        Err(OauthError::MissingRefreshToken) => {
            info!("No saved refresh token, starting interactive login");
        }
        Err(err) => {
            warn!(error = %err, "Saved refresh token rejected, starting interactive login");
        }
    }

    let fresh = interactive.obtain(endpoints, http).await?;
    Ok(Arc::new(sniffing_source(endpoints, http, fresh)))
}

fn sniffing_source(
    endpoints: &SourceOauthEndpoints,
    http: &reqwest::Client,
    initial: Credential,
) -> SourceTokens {
    TokenSniffer::new(
        RefreshingTokenSource::new(endpoints.clone(), http.clone(), initial.clone()),
        initial,
    )
}
