use async_trait::async_trait;
use axum::{
    Router,
    extract::{Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::get,
};
use oauth2::{AuthorizationCode, RedirectUrl};
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use url::Url;

use super::credential::Credential;
use super::endpoints::SourceOauthEndpoints;
use crate::config::SourceConfig;
use crate::error::OauthError;

const SUCCESS_PAGE: &str = "<h1>Success</h1>You can now safely close this window.";

/// Browsers tried, in order, to open the authorization URL.
const BROWSER_COMMANDS: [&str; 3] = ["xdg-open", "open", "google-chrome"];

/// Obtains a brand new credential with user involvement.
#[async_trait]
pub trait InteractiveLogin: Send + Sync {
    async fn obtain(
        &self,
        endpoints: &SourceOauthEndpoints,
        http: &reqwest::Client,
    ) -> Result<Credential, OauthError>;
}

type UrlOpener = Arc<dyn Fn(Url) + Send + Sync>;

/// Authorization-code flow through the user's browser and a local callback listener.
pub struct BrowserLogin {
    callback_addr: SocketAddr,
    open_browser: bool,
    opener: Option<UrlOpener>,
}

impl BrowserLogin {
    pub fn new(callback_addr: SocketAddr, open_browser: bool) -> Self {
        Self {
            callback_addr,
            open_browser,
            opener: None,
        }
    }

    pub fn from_config(cfg: &SourceConfig) -> Self {
        Self::new(cfg.callback_addr, cfg.open_browser)
    }

    /// Replaces the system browser launcher.
    pub fn with_opener(mut self, opener: impl Fn(Url) + Send + Sync + 'static) -> Self {
        self.opener = Some(Arc::new(opener));
        self.open_browser = true;
        self
    }

    fn open(&self, url: Url) {
        if !self.open_browser {
            return;
        }
        match &self.opener {
            Some(opener) => opener(url),
            None => {
                tokio::spawn(open_in_browser(url));
            }
        }
    }
}

#[async_trait]
impl InteractiveLogin for BrowserLogin {
    async fn obtain(
        &self,
        endpoints: &SourceOauthEndpoints,
        http: &reqwest::Client,
    ) -> Result<Credential, OauthError> {
        let listener = TcpListener::bind(self.callback_addr)
            .await
            .map_err(OauthError::Callback)?;
        let addr = listener.local_addr().map_err(OauthError::Callback)?;
        let redirect = RedirectUrl::new(format!("http://{addr}/"))?;

        let (auth_url, csrf) = endpoints.build_authorize_url(redirect.clone());
        let (code_tx, mut code_rx) = mpsc::channel(1);
        let app = callback_router(CallbackState {
            expected_state: Arc::new(csrf.secret().to_string()),
            code_tx,
        });

        let shutdown = CancellationToken::new();
        let server_shutdown = shutdown.clone();
        tokio::spawn(async move {
            let served = axum::serve(listener, app)
                .with_graceful_shutdown(async move { server_shutdown.cancelled().await })
                .await;
            if let Err(err) = served {
                warn!(error = %err, "OAuth callback listener stopped with error");
            }
        });

        info!(callback = %addr, "Authorize this app at: {auth_url}");
        self.open(auth_url);

        let outcome = code_rx.recv().await;
        shutdown.cancel();

        let code = outcome.ok_or_else(|| OauthError::Flow {
            code: "CALLBACK_CLOSED".to_string(),
            message: "OAuth callback listener closed before receiving a code".to_string(),
        })??;

        endpoints
            .exchange_authorization_code(AuthorizationCode::new(code), redirect, http)
            .await
    }
}

#[derive(Clone)]
struct CallbackState {
    expected_state: Arc<String>,
    code_tx: mpsc::Sender<Result<String, OauthError>>,
}

#[derive(Debug, Deserialize)]
struct CallbackQuery {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

fn callback_router(state: CallbackState) -> Router {
    Router::new()
        .route("/favicon.ico", get(|| async { StatusCode::NOT_FOUND }))
        .fallback(oauth_callback)
        .with_state(state)
}

async fn oauth_callback(
    State(state): State<CallbackState>,
    Query(query): Query<CallbackQuery>,
) -> Response {
    let state_matches = query
        .state
        .as_deref()
        .map(|s| bool::from(s.as_bytes().ct_eq(state.expected_state.as_bytes())))
        .unwrap_or(false);
    if !state_matches {
        warn!("OAuth callback state doesn't match, ignoring request");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    if let Some(error) = query.error {
        let message = query.error_description.unwrap_or_else(|| error.clone());
        warn!(error = %error, "Authorization was denied");
        let _ = state.code_tx.try_send(Err(OauthError::Flow {
            code: error,
            message,
        }));
        return (StatusCode::FORBIDDEN, "Authorization denied").into_response();
    }

    match query.code.filter(|c| !c.is_empty()) {
        Some(code) => {
            let _ = state.code_tx.try_send(Ok(code));
            Html(SUCCESS_PAGE).into_response()
        }
        None => {
            warn!("OAuth callback without code");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn open_in_browser(url: Url) {
    for bin in BROWSER_COMMANDS {
        let status = tokio::process::Command::new(bin)
            .arg(url.as_str())
            .status()
            .await;
        if matches!(status, Ok(s) if s.success()) {
            return;
        }
    }
    warn!("Error opening URL in browser, open it manually");
}
