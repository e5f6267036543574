use oauth2::basic::{
    BasicErrorResponse, BasicRevocationErrorResponse, BasicTokenIntrospectionResponse,
    BasicTokenResponse,
};
use oauth2::{
    AuthUrl, AuthorizationCode, Client as OAuth2Client, ClientId, ClientSecret, CsrfToken,
    EndpointNotSet, EndpointSet, RedirectUrl, RefreshToken, Scope, StandardRevocableToken,
    TokenUrl,
};
use tracing::info;
use url::Url;

use super::credential::Credential;
use crate::config::SourceConfig;
use crate::error::OauthError;
use crate::utils::url::join_path;

/// The source API grants a single scope covering read access to logs.
const SOURCE_SCOPE: &str = "all";

pub(crate) type OauthTokenResponse = BasicTokenResponse;

/// A standard OAuth2 client for `authorization_code` + `refresh_token` flows.
pub(crate) type StandardOauth2Client<
    HasAuthUrl = EndpointSet,
    HasDeviceAuthUrl = EndpointNotSet,
    HasIntrospectionUrl = EndpointNotSet,
    HasRevocationUrl = EndpointNotSet,
    HasTokenUrl = EndpointSet,
> = OAuth2Client<
    BasicErrorResponse,
    OauthTokenResponse,
    BasicTokenIntrospectionResponse,
    StandardRevocableToken,
    BasicRevocationErrorResponse,
    HasAuthUrl,
    HasDeviceAuthUrl,
    HasIntrospectionUrl,
    HasRevocationUrl,
    HasTokenUrl,
>;

/// OAuth endpoints of the log source, derived from its base API URL
/// (`<api_url>/auth/authorize` and `<api_url>/auth/token`).
#[derive(Clone)]
pub struct SourceOauthEndpoints {
    client: StandardOauth2Client,
}

impl SourceOauthEndpoints {
    pub fn from_config(cfg: &SourceConfig) -> Result<Self, OauthError> {
        let auth_url = join_path(&cfg.api_url, &["auth", "authorize"]);
        let token_url = join_path(&cfg.api_url, &["auth", "token"]);
        Self::new(&cfg.client_id, &cfg.client_secret, &auth_url, &token_url)
    }

    pub fn new(
        client_id: &str,
        client_secret: &str,
        auth_url: &Url,
        token_url: &Url,
    ) -> Result<Self, OauthError> {
        let client = OAuth2Client::<
            BasicErrorResponse,
            OauthTokenResponse,
            BasicTokenIntrospectionResponse,
            StandardRevocableToken,
            BasicRevocationErrorResponse,
        >::new(ClientId::new(client_id.to_string()))
        .set_client_secret(ClientSecret::new(client_secret.to_string()))
        .set_auth_uri(AuthUrl::new(auth_url.to_string())?)
        .set_token_uri(TokenUrl::new(token_url.to_string())?);

        Ok(Self { client })
    }

    pub fn auth_url(&self) -> &str {
        self.client.auth_uri().as_str()
    }

    pub fn token_url(&self) -> &str {
        self.client.token_uri().as_str()
    }

    /// Authorization URL the user opens in a browser, plus the CSRF state it carries.
    pub fn build_authorize_url(&self, redirect: RedirectUrl) -> (Url, CsrfToken) {
        self.client
            .clone()
            .set_redirect_uri(redirect)
            .authorize_url(CsrfToken::new_random)
            .add_scope(Scope::new(SOURCE_SCOPE.to_string()))
            .url()
    }

    pub async fn exchange_authorization_code(
        &self,
        code: AuthorizationCode,
        redirect: RedirectUrl,
        http_client: &reqwest::Client,
    ) -> Result<Credential, OauthError> {
        let token_result: OauthTokenResponse = self
            .client
            .clone()
            .set_redirect_uri(redirect)
            .exchange_code(code)
            .request_async(http_client)
            .await?;
        info!("OAuth2 code exchange completed successfully");
        Ok(Credential::from_token_response(&token_result, None))
    }

    pub(crate) async fn refresh_access_token(
        &self,
        refresh_token: &str,
        http_client: &reqwest::Client,
    ) -> Result<OauthTokenResponse, OauthError> {
        let token_result: OauthTokenResponse = self
            .client
            .exchange_refresh_token(&RefreshToken::new(refresh_token.to_string()))
            .request_async(http_client)
            .await?;
        Ok(token_result)
    }
}
