use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use logrelay_schema::{Log, LogPage};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use url::Url;

use super::PageSource;
use super::state::{SavedState, connection_hash};
use super::transport::AuthorizedTransport;
use crate::backoff::Backoff;
use crate::config::SourceConfig;
use crate::error::RelayError;
use crate::oauth::{InteractiveLogin, SourceOauthEndpoints, SourceTokens, login};
use crate::utils::url::join_path;

const USER_AGENT: &str = concat!("logrelay/", env!("CARGO_PKG_VERSION"));

/// Walks the paginated logs endpoint of one app, newest pages last.
///
/// The cursor is the full URL of the next page to request. It only moves when a page carries a
/// `previous` link; until then the same URL is polled with an exponential backoff.
pub struct SourceClient {
    config_hash: Vec<u8>,
    app_id: i64,
    next_page_url: Url,
    transport: AuthorizedTransport<SourceTokens>,
    poll_backoff: (Duration, Duration),
}

impl SourceClient {
    /// Restores the cursor from `saved_state` when it matches `cfg`, then logs in.
    ///
    /// Login failure is fatal here and surfaces as [`RelayError::Authentication`].
    pub async fn connect(
        cfg: &SourceConfig,
        saved_state: Option<&[u8]>,
        interactive: &dyn InteractiveLogin,
    ) -> Result<Self, RelayError> {
        let config_hash = connection_hash(cfg);
        let mut next_page_url = first_page_url(cfg, Utc::now());
        let mut refresh_token = None;

        match saved_state.and_then(|b| SavedState::decode_matching(b, &config_hash, cfg.app_id)) {
            Some(state) => {
                info!(next_page = %state.next_page_url, "Resuming from saved state");
                next_page_url = state.next_page_url;
                refresh_token = state.refresh_token;
            }
            None if saved_state.is_some() => {
                info!("Saved state does not match this configuration, starting from now");
            }
            None => {
                debug!("No saved state, starting from now");
            }
        }

        let endpoints = SourceOauthEndpoints::from_config(cfg)?;
        let oauth_http = build_http_client(cfg, reqwest::redirect::Policy::none())?;
        let tokens = login(&endpoints, &oauth_http, refresh_token, interactive).await?;

        let http = build_http_client(cfg, reqwest::redirect::Policy::default())?;
        Ok(Self {
            config_hash,
            app_id: cfg.app_id,
            next_page_url,
            transport: AuthorizedTransport::new(http, tokens),
            poll_backoff: cfg.poll_backoff(),
        })
    }

    pub fn next_page_url(&self) -> &Url {
        &self.next_page_url
    }

    /// Blocks until a page with new records is available, or `cancel` fires.
    ///
    /// A failed fetch is returned as is and leaves the cursor where it was.
    pub async fn get_next_page(
        &mut self,
        cancel: &CancellationToken,
    ) -> Result<Vec<Log>, RelayError> {
        let (initial, max) = self.poll_backoff;
        let mut backoff = Backoff::new(initial, max);
        loop {
            if cancel.is_cancelled() {
                return Err(RelayError::Cancelled);
            }

            let page = tokio::select! {
                _ = cancel.cancelled() => return Err(RelayError::Cancelled),
                page = self.fetch_page(&self.next_page_url) => page?,
            };

            match page.previous {
                Some(previous) => {
                    debug!(records = page.data.len(), next_page = %previous, "Fetched logs page");
                    self.next_page_url = previous;
                    return Ok(page.data);
                }
                None => {
                    debug!(
                        delay = ?backoff.next_delay(),
                        "No new logs yet, waiting before polling again"
                    );
                    backoff.wait(cancel).await;
                }
            }
        }
    }

    /// Serializes the cursor and the latest refresh token.
    pub fn get_state(&self) -> Result<Vec<u8>, RelayError> {
        let credential = self.transport.tokens().current();
        let state = SavedState::new(
            &self.config_hash,
            self.app_id,
            self.next_page_url.clone(),
            credential.refresh_token().map(str::to_string),
        );
        Ok(state.encode()?)
    }

    async fn fetch_page(&self, url: &Url) -> Result<LogPage, RelayError> {
        let resp = self.transport.get(url).await?;
        let status = resp.status();
        let body = resp.bytes().await?;

        if !status.is_success() {
            return Err(RelayError::UpstreamStatus {
                status,
                body: String::from_utf8_lossy(&body).into_owned(),
            });
        }

        serde_json::from_slice(&body).map_err(|err| RelayError::MalformedPage {
            message: err.to_string(),
            body: String::from_utf8_lossy(&body).into_owned(),
        })
    }
}

#[async_trait]
impl PageSource for SourceClient {
    async fn next_page(&mut self, cancel: &CancellationToken) -> Result<Vec<Log>, RelayError> {
        self.get_next_page(cancel).await
    }

    fn state(&self) -> Result<Vec<u8>, RelayError> {
        self.get_state()
    }
}

/// URL of the first page on a cold start: logs from `start` on, `page_size` per page.
pub fn first_page_url(cfg: &SourceConfig, start: DateTime<Utc>) -> Url {
    let app_id = cfg.app_id.to_string();
    let mut url = join_path(
        &cfg.api_url,
        &["api", "app", app_id.as_str(), "logs", "paginated"],
    );
    url.set_fragment(None);
    url.query_pairs_mut()
        .append_pair(
            "date_range_start",
            &start.to_rfc3339_opts(SecondsFormat::Secs, true),
        )
        .append_pair("page_size", &cfg.page_size.to_string());
    url
}

fn build_http_client(
    cfg: &SourceConfig,
    redirect: reqwest::redirect::Policy,
) -> Result<reqwest::Client, RelayError> {
    let client = reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .connect_timeout(Duration::from_secs(10))
        .timeout(cfg.request_timeout())
        .redirect(redirect)
        .danger_accept_invalid_certs(cfg.insecure_skip_tls_verify)
        .build()?;
    Ok(client)
}
