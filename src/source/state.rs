use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use url::Url;

use crate::config::SourceConfig;

/// Bumped whenever the persisted layout changes; other versions are discarded.
pub const STATE_VERSION: u32 = 1;

/// Durable resumption point: where to fetch next and how to log in again.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct SavedState {
    pub version: u32,
    /// Base64 SHA-256 of the connection parameters, see [`connection_hash`].
    pub config_hash: String,
    pub app_id: i64,
    pub next_page_url: Url,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

impl SavedState {
    pub fn new(
        config_hash: &[u8],
        app_id: i64,
        next_page_url: Url,
        refresh_token: Option<String>,
    ) -> Self {
        Self {
            version: STATE_VERSION,
            config_hash: STANDARD.encode(config_hash),
            app_id,
            next_page_url,
            refresh_token,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn decode(bytes: &[u8]) -> Option<Self> {
        serde_json::from_slice(bytes).ok()
    }

    /// Decodes `bytes` and keeps the state only if it belongs to this connection and app.
    ///
    /// Corrupt, foreign, and outdated states are all treated as absent.
    pub fn decode_matching(bytes: &[u8], config_hash: &[u8], app_id: i64) -> Option<Self> {
        Self::decode(bytes).filter(|state| {
            state.version == STATE_VERSION
                && state.app_id == app_id
                && STANDARD
                    .decode(&state.config_hash)
                    .is_ok_and(|hash| hash == config_hash)
        })
    }
}

/// Deterministic digest of the connection parameters.
///
/// Each of `api_url`, `client_id` and `client_secret` is fed in that order, prefixed with its
/// big-endian byte length so that field boundaries are part of the digest.
pub fn connection_hash(cfg: &SourceConfig) -> Vec<u8> {
    let mut hasher = Sha256::new();
    for part in [cfg.api_url.as_str(), &cfg.client_id, &cfg.client_secret] {
        hasher.update((part.len() as u64).to_be_bytes());
        hasher.update(part.as_bytes());
    }
    hasher.finalize().to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> SourceConfig {
        SourceConfig {
            client_id: "cid".to_string(),
            client_secret: "secret".to_string(),
            app_id: 42,
            ..SourceConfig::default()
        }
    }

    fn state_for(cfg: &SourceConfig) -> SavedState {
        SavedState::new(
            &connection_hash(cfg),
            cfg.app_id,
            Url::parse("https://api.test/api/app/42/logs/paginated?cursor=X").unwrap(),
            Some("rt".to_string()),
        )
    }

    #[test]
    fn hash_is_stable_and_sensitive_to_every_parameter() {
        let base = cfg();
        assert_eq!(connection_hash(&base), connection_hash(&base.clone()));
        assert_eq!(connection_hash(&base).len(), 32);

        let mut other = base.clone();
        other.client_secret = "rotated".to_string();
        assert_ne!(connection_hash(&base), connection_hash(&other));

        let mut other = base.clone();
        other.api_url = Url::parse("https://onprem.test").unwrap();
        assert_ne!(connection_hash(&base), connection_hash(&other));

        // page size and app id are not part of the connection identity
        let mut other = base.clone();
        other.page_size = 10;
        other.app_id = 7;
        assert_eq!(connection_hash(&base), connection_hash(&other));
    }

    #[test]
    fn hash_keeps_field_boundaries() {
        let mut left = cfg();
        left.client_id = "ab".to_string();
        left.client_secret = "c".to_string();
        let mut right = cfg();
        right.client_id = "a".to_string();
        right.client_secret = "bc".to_string();
        assert_ne!(connection_hash(&left), connection_hash(&right));
    }

    #[test]
    fn matching_state_round_trips() {
        let cfg = cfg();
        let state = state_for(&cfg);
        let bytes = state.encode().unwrap();
        let decoded = SavedState::decode_matching(&bytes, &connection_hash(&cfg), 42)
            .expect("matching state");
        assert_eq!(decoded, state);
    }

    #[test]
    fn foreign_app_or_connection_is_rejected() {
        let cfg = cfg();
        let bytes = state_for(&cfg).encode().unwrap();
        let hash = connection_hash(&cfg);

        assert!(SavedState::decode_matching(&bytes, &hash, 43).is_none());
        assert!(SavedState::decode_matching(&bytes, &[0u8; 32], 42).is_none());
    }

    #[test]
    fn corrupt_or_outdated_state_is_rejected() {
        let cfg = cfg();
        let hash = connection_hash(&cfg);
        assert!(SavedState::decode_matching(b"not json", &hash, 42).is_none());
        assert!(SavedState::decode_matching(b"", &hash, 42).is_none());

        let mut state = state_for(&cfg);
        state.version = STATE_VERSION + 1;
        assert!(SavedState::decode_matching(&state.encode().unwrap(), &hash, 42).is_none());
    }
}
