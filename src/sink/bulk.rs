use ahash::AHashMap;
use async_trait::async_trait;
use backon::{ExponentialBuilder, Retryable};
use logrelay_schema::Log;
use reqwest::header::CONTENT_TYPE;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

use super::LogWriter;
use crate::config::ElasticsearchConfig;
use crate::error::{IsRetryable, SinkError};
use crate::utils::url::join_path;

const NDJSON: &str = "application/x-ndjson";

struct BulkItem {
    id: Uuid,
    doc: String,
}

/// Documents waiting for the next flush, deduplicated by uuid.
#[derive(Default)]
struct BulkBuffer {
    items: Vec<BulkItem>,
    positions: AHashMap<Uuid, usize>,
}

impl BulkBuffer {
    fn add(&mut self, log: &Log) -> Result<(), SinkError> {
        let doc = serde_json::to_string(log).map_err(|source| SinkError::Encode {
            id: log.uuid,
            source,
        })?;
        match self.positions.get(&log.uuid) {
            Some(&pos) => self.items[pos].doc = doc,
            None => {
                self.positions.insert(log.uuid, self.items.len());
                self.items.push(BulkItem { id: log.uuid, doc });
            }
        }
        Ok(())
    }

    fn render(&self, index: &str) -> Result<String, SinkError> {
        #[derive(Serialize)]
        struct IndexAction<'a> {
            index: ActionMeta<'a>,
        }
        #[derive(Serialize)]
        struct ActionMeta<'a> {
            #[serde(rename = "_index")]
            index: &'a str,
            #[serde(rename = "_id")]
            id: String,
        }

        let mut body = String::new();
        for item in &self.items {
            let action = IndexAction {
                index: ActionMeta {
                    index,
                    id: item.id.to_string(),
                },
            };
            let line = serde_json::to_string(&action).map_err(|source| SinkError::Encode {
                id: item.id,
                source,
            })?;
            body.push_str(&line);
            body.push('\n');
            body.push_str(&item.doc);
            body.push('\n');
        }
        Ok(body)
    }

    fn clear(&mut self) {
        self.items.clear();
        self.positions.clear();
    }
}

/// State shared between the writer and its flush ticker.
struct BulkShared {
    http: reqwest::Client,
    nodes: Vec<Url>,
    next_node: AtomicUsize,
    index: String,
    username: Option<String>,
    password: Option<String>,
    retry_policy: ExponentialBuilder,
    buffer: Mutex<BulkBuffer>,
}

impl BulkShared {
    /// Submits everything buffered in one bulk request. The buffer is only cleared on success.
    async fn flush(&self, cancel: &CancellationToken) -> Result<(), SinkError> {
        let mut buffer = self.buffer.lock().await;
        if buffer.items.is_empty() {
            return Ok(());
        }
        let body = buffer.render(&self.index)?;
        let count = buffer.items.len();

        let raw = self.submit_with_retry(body, cancel).await?;
        let resp: BulkResponse = serde_json::from_slice(&raw).map_err(SinkError::Response)?;
        let failed = resp.log_item_failures();

        buffer.clear();
        debug!(count, failed, "Bulk flush completed");
        Ok(())
    }

    async fn submit_with_retry(
        &self,
        body: String,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>, SinkError> {
        (|| {
            let node = &self.nodes[self.next_node.load(Ordering::Relaxed) % self.nodes.len()];
            let url = join_path(node, &["_bulk"]);
            let body = body.clone();
            async move { self.submit(url, body).await }
        })
        .retry(self.retry_policy)
        .when(|err: &SinkError| err.is_retryable() && !cancel.is_cancelled())
        .notify(|err, dur: Duration| {
            self.next_node.fetch_add(1, Ordering::Relaxed);
            warn!(error = %err, "Bulk request failed, retrying in {:?}", dur);
        })
        .await
    }

    async fn submit(&self, url: Url, body: String) -> Result<Vec<u8>, SinkError> {
        let mut request = self
            .http
            .post(url)
            .header(CONTENT_TYPE, NDJSON)
            .body(body);
        if let Some(username) = &self.username {
            request = request.basic_auth(username, self.password.as_deref());
        }

        let resp = request.send().await?;
        let status = resp.status();
        let bytes = resp.bytes().await?;
        if !status.is_success() {
            return Err(SinkError::Status {
                status,
                body: String::from_utf8_lossy(&bytes).into_owned(),
            });
        }
        Ok(bytes.to_vec())
    }
}

struct FlushTicker {
    stop: CancellationToken,
    handle: JoinHandle<()>,
}

/// Elasticsearch `_bulk` writer.
///
/// Records are buffered as `index` actions keyed by their uuid, so re-sending a record
/// overwrites the same document. The buffer is flushed when it holds `flush_items` documents,
/// every `flush_interval` by a background ticker, and on close. A failed flush keeps the
/// buffer; the items go out again with the next flush.
pub struct BulkIndexWriter {
    shared: Arc<BulkShared>,
    flush_items: usize,
    flush_interval: Duration,
    ticker: Option<FlushTicker>,
}

impl BulkIndexWriter {
    pub fn new(cfg: &ElasticsearchConfig) -> Result<Self, SinkError> {
        if cfg.nodes.is_empty() {
            return Err(SinkError::NoNodes);
        }
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(60))
            .build()?;
        let retry_policy = ExponentialBuilder::default()
            .with_min_delay(Duration::from_millis(100))
            .with_max_delay(Duration::from_secs(2))
            .with_max_times(cfg.max_retries)
            .with_jitter();

        Ok(Self {
            shared: Arc::new(BulkShared {
                http,
                nodes: cfg.nodes.clone(),
                next_node: AtomicUsize::new(0),
                index: cfg.index.clone(),
                username: cfg.username.clone(),
                password: cfg.password.clone(),
                retry_policy,
                buffer: Mutex::new(BulkBuffer::default()),
            }),
            flush_items: cfg.flush_items.max(1),
            flush_interval: cfg.flush_interval().max(Duration::from_millis(100)),
            ticker: None,
        })
    }

    /// Documents waiting for the next flush.
    pub async fn buffered(&self) -> usize {
        self.shared.buffer.lock().await.items.len()
    }

    /// Starts the periodic flush on first use, so construction needs no runtime.
    fn ensure_ticker(&mut self) {
        if self.ticker.is_some() {
            return;
        }
        let stop = CancellationToken::new();
        let handle = tokio::spawn(run_flush_ticker(
            self.shared.clone(),
            self.flush_interval,
            stop.clone(),
        ));
        self.ticker = Some(FlushTicker { stop, handle });
    }
}

async fn run_flush_ticker(shared: Arc<BulkShared>, period: Duration, stop: CancellationToken) {
    let mut ticks = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = stop.cancelled() => return,
            _ = ticks.tick() => {}
        }
        if let Err(err) = shared.flush(&stop).await {
            warn!(error = %err, "Periodic bulk flush failed, keeping buffered documents");
        }
    }
}

#[async_trait]
impl LogWriter for BulkIndexWriter {
    async fn write_logs(
        &mut self,
        cancel: &CancellationToken,
        logs: &[Log],
    ) -> Result<(), SinkError> {
        self.ensure_ticker();
        let pending = {
            let mut buffer = self.shared.buffer.lock().await;
            for log in logs {
                buffer.add(log)?;
            }
            buffer.items.len()
        };
        if pending >= self.flush_items {
            self.shared.flush(cancel).await?;
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<(), SinkError> {
        if let Some(ticker) = self.ticker.take() {
            ticker.stop.cancel();
            if let Err(err) = ticker.handle.await {
                warn!(error = %err, "Bulk flush ticker ended abnormally");
            }
        }
        let pending = self.buffered().await;
        self.shared.flush(&CancellationToken::new()).await?;
        info!(flushed = pending, "Bulk writer closed");
        Ok(())
    }
}

impl Drop for BulkIndexWriter {
    fn drop(&mut self) {
        if let Some(ticker) = &self.ticker {
            ticker.stop.cancel();
        }
    }
}

#[derive(Debug, Deserialize)]
struct BulkResponse {
    #[serde(default)]
    errors: bool,
    #[serde(default)]
    items: Vec<HashMap<String, BulkItemResult>>,
}

#[derive(Debug, Deserialize)]
struct BulkItemResult {
    #[serde(rename = "_id", default)]
    id: Option<String>,
    #[serde(default)]
    status: u16,
    #[serde(default)]
    error: Option<BulkItemError>,
}

#[derive(Debug, Deserialize)]
struct BulkItemError {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    reason: String,
}

impl BulkResponse {
    /// Per-document rejections do not fail the batch; they are reported and counted.
    fn log_item_failures(&self) -> usize {
        if !self.errors {
            return 0;
        }
        let mut failed = 0;
        for result in self.items.iter().flat_map(|item| item.values()) {
            if let Some(err) = &result.error {
                failed += 1;
                warn!(
                    id = result.id.as_deref().unwrap_or("<unknown>"),
                    status = result.status,
                    "Bulk item rejected: {}: {}",
                    err.kind,
                    err.reason
                );
            }
        }
        failed
    }
}
