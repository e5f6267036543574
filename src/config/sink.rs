use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

/// Destination selection.
///
/// When both are configured the bulk index wins.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct SinkConfig {
    /// Print records to stdout instead of indexing them (for debugging).
    /// TOML: `sink.console`. Default: `false`.
    #[serde(default)]
    pub console: bool,

    /// Elasticsearch bulk index destination.
    /// TOML: `[sink.elasticsearch]`. Default: unset.
    #[serde(default)]
    pub elasticsearch: Option<ElasticsearchConfig>,
}

#[derive(Debug, Clone, Copy)]
pub enum SinkSelection<'a> {
    Elasticsearch(&'a ElasticsearchConfig),
    Console,
}

impl SinkConfig {
    pub fn selected(&self) -> Option<SinkSelection<'_>> {
        match &self.elasticsearch {
            Some(es) if !es.index.trim().is_empty() && !es.nodes.is_empty() => {
                Some(SinkSelection::Elasticsearch(es))
            }
            _ if self.console => Some(SinkSelection::Console),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ElasticsearchConfig {
    /// Index documents are written to.
    /// TOML: `sink.elasticsearch.index`. Default: `logs`.
    #[serde(default = "default_index")]
    pub index: String,

    /// Cluster node base URLs; requests rotate across them on failure.
    /// TOML: `sink.elasticsearch.nodes`.
    #[serde(default)]
    pub nodes: Vec<Url>,

    /// TOML: `sink.elasticsearch.username`.
    #[serde(default)]
    pub username: Option<String>,

    /// TOML: `sink.elasticsearch.password`.
    #[serde(default)]
    pub password: Option<String>,

    /// Buffered documents that trigger a flush.
    /// TOML: `sink.elasticsearch.flush_items`. Default: `1000`.
    #[serde(default = "default_flush_items")]
    pub flush_items: usize,

    /// Period of the background flush of buffered documents.
    /// TOML: `sink.elasticsearch.flush_interval_secs`. Default: `30`.
    #[serde(default = "default_flush_interval_secs")]
    pub flush_interval_secs: u64,

    /// Retries for throttled or unavailable bulk requests.
    /// TOML: `sink.elasticsearch.max_retries`. Default: `5`.
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,
}

impl Default for ElasticsearchConfig {
    fn default() -> Self {
        Self {
            index: default_index(),
            nodes: Vec::new(),
            username: None,
            password: None,
            flush_items: default_flush_items(),
            flush_interval_secs: default_flush_interval_secs(),
            max_retries: default_max_retries(),
        }
    }
}

impl ElasticsearchConfig {
    pub fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.flush_interval_secs)
    }
}

fn default_index() -> String {
    "logs".to_string()
}

fn default_flush_items() -> usize {
    1000
}

fn default_flush_interval_secs() -> u64 {
    30
}

fn default_max_retries() -> usize {
    5
}
