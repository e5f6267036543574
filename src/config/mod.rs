mod basic;
mod sink;
mod source;

pub use basic::BasicConfig;
pub use sink::{ElasticsearchConfig, SinkConfig, SinkSelection};
pub use source::SourceConfig;

use crate::error::RelayError;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Application configuration managed by Figment.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Config {
    /// Process-level settings (see `basic` table in logrelay.toml).
    #[serde(default)]
    pub basic: BasicConfig,

    /// Log source connection (see `source` table).
    #[serde(default)]
    pub source: SourceConfig,

    /// Destination selection (see `sink` table).
    #[serde(default)]
    pub sink: SinkConfig,
}

pub const DEFAULT_CONFIG_FILE: &str = "logrelay.toml";

/// Prefix for environment overrides; `__` separates tables, e.g. `LOGRELAY_SOURCE__APP_ID`.
pub const ENV_PREFIX: &str = "LOGRELAY_";

impl Config {
    /// Builds a Figment that merges defaults, the TOML file if present, and the environment.
    pub fn figment(path: &Path) -> Figment {
        let figment = Figment::new().merge(Serialized::defaults(Config::default()));
        let figment = if path.is_file() {
            figment.merge(Toml::file(path))
        } else {
            figment
        };
        figment.merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Loads configuration from all layers without validating it.
    pub fn load(path: &Path) -> Result<Self, RelayError> {
        Self::figment(path).extract().map_err(|err| {
            RelayError::Configuration(format!(
                "failed to extract configuration from {}: {err}",
                path.display()
            ))
        })
    }

    /// Checks the mandatory fields. Call after command-line overrides are applied.
    pub fn validate(&self) -> Result<(), RelayError> {
        self.source.validate()?;
        if self.sink.selected().is_none() {
            return Err(RelayError::Configuration(
                "no destination specified: set sink.console or sink.elasticsearch".to_string(),
            ));
        }
        Ok(())
    }

    /// Copy safe to print: secrets are replaced.
    pub fn redacted(&self) -> Self {
        let mut cfg = self.clone();
        cfg.source.client_secret = redact(&cfg.source.client_secret);
        if let Some(es) = cfg.sink.elasticsearch.as_mut() {
            es.password = es.password.as_deref().map(redact);
        }
        cfg
    }
}

fn redact(secret: &str) -> String {
    if secret.is_empty() {
        String::new()
    } else {
        "<redacted>".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_toml(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .expect("temp file");
        file.write_all(contents.as_bytes()).expect("write toml");
        file
    }

    #[test]
    fn defaults_match_documented_values() {
        let cfg = Config::default();
        assert_eq!(cfg.basic.loglevel, "info");
        assert_eq!(cfg.basic.checkpoint_interval_secs, 300);
        assert_eq!(cfg.basic.max_consecutive_failures, 10);
        assert_eq!(cfg.source.page_size, 10_000);
        assert_eq!(cfg.source.api_url.as_str(), "https://dashboard.bugfender.com/");
        assert!(!cfg.sink.console);
        assert!(cfg.sink.elasticsearch.is_none());
    }

    #[test]
    fn toml_file_overrides_defaults() {
        let file = write_toml(
            r#"
            [basic]
            state_file = "/var/lib/logrelay/state.json"
            max_consecutive_failures = 3

            [source]
            client_id = "cid"
            client_secret = "secret"
            app_id = 42

            [sink.elasticsearch]
            nodes = ["http://es-1:9200", "http://es-2:9200"]
            "#,
        );

        let cfg = Config::load(file.path()).expect("load config");
        cfg.validate().expect("valid config");

        assert_eq!(cfg.basic.max_consecutive_failures, 3);
        assert_eq!(cfg.source.app_id, 42);
        let es = cfg.sink.elasticsearch.as_ref().expect("es table");
        assert_eq!(es.index, "logs");
        assert_eq!(es.nodes.len(), 2);
        assert!(matches!(
            cfg.sink.selected(),
            Some(SinkSelection::Elasticsearch(_))
        ));
    }

    #[test]
    fn missing_credentials_fail_validation() {
        let file = write_toml(
            r#"
            [source]
            app_id = 42

            [sink]
            console = true
            "#,
        );
        let cfg = Config::load(file.path()).expect("load config");
        let err = cfg.validate().expect_err("client id is mandatory");
        assert!(matches!(err, RelayError::Configuration(_)));
    }

    #[test]
    fn missing_destination_fails_validation() {
        let mut cfg = Config::default();
        cfg.source.client_id = "cid".to_string();
        cfg.source.client_secret = "secret".to_string();
        cfg.source.app_id = 7;

        assert!(cfg.validate().is_err());
        cfg.sink.console = true;
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn redacted_hides_secrets() {
        let mut cfg = Config::default();
        cfg.source.client_secret = "top-secret".to_string();
        let shown = serde_json::to_string(&cfg.redacted()).expect("serialize");
        assert!(!shown.contains("top-secret"));
    }
}
