use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

use crate::error::RelayError;

/// Sync state checkpoint on the local filesystem.
///
/// Writes go to a sibling temp file that is renamed over the target, so a crash never leaves a
/// half-written state behind.
#[derive(Debug, Clone)]
pub struct StateFile {
    path: PathBuf,
}

impl StateFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the saved state. A missing file is a cold start, not an error.
    pub async fn load(&self) -> Result<Option<Vec<u8>>, RelayError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(source) => Err(self.persistence_error(source)),
        }
    }

    pub async fn save(&self, bytes: &[u8]) -> Result<(), RelayError> {
        let tmp = self.tmp_path();
        self.write_tmp(&tmp, bytes)
            .await
            .map_err(|source| self.persistence_error(source))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|source| self.persistence_error(source))
    }

    async fn write_tmp(&self, tmp: &Path, bytes: &[u8]) -> std::io::Result<()> {
        let mut options = tokio::fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        options.mode(0o600);

        let mut file = options.open(tmp).await?;
        file.write_all(bytes).await?;
        file.sync_all().await
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    fn persistence_error(&self, source: std::io::Error) -> RelayError {
        RelayError::Persistence {
            path: self.path.clone(),
            source,
        }
    }
}
