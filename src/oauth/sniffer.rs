use async_trait::async_trait;
use std::sync::{PoisonError, RwLock};

use super::credential::{Credential, TokenSource};
use crate::error::OauthError;

/// Wraps a token source and remembers the last credential it handed out.
///
/// The refreshing source keeps its state private; this is how a refreshed (and possibly
/// rotated) refresh token reaches the persisted sync state.
pub struct TokenSniffer<S> {
    inner: S,
    current: RwLock<Credential>,
}

impl<S: TokenSource> TokenSniffer<S> {
    pub fn new(inner: S, initial: Credential) -> Self {
        Self {
            inner,
            current: RwLock::new(initial),
        }
    }

    /// Last credential successfully obtained, or the initial one before any refresh.
    pub fn current(&self) -> Credential {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl<S: TokenSource> TokenSource for TokenSniffer<S> {
    async fn token(&self) -> Result<Credential, OauthError> {
        let credential = self.inner.token().await?;
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = credential.clone();
        Ok(credential)
    }
}
