use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::StateFile;
use crate::backoff::Backoff;
use crate::config::BasicConfig;
use crate::error::{IsRetryable, RelayError};
use crate::sink::LogWriter;
use crate::source::PageSource;

/// Retry and checkpoint policy of the sync loop.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub checkpoint_interval: Duration,
    /// Consecutive failed cycles that abort the loop. `0` never aborts.
    pub max_consecutive_failures: u32,
    pub retry_backoff_initial: Duration,
    pub retry_backoff_max: Duration,
}

impl SyncOptions {
    pub fn from_config(cfg: &BasicConfig) -> Self {
        let (retry_backoff_initial, retry_backoff_max) = cfg.retry_backoff();
        Self {
            checkpoint_interval: cfg.checkpoint_interval(),
            max_consecutive_failures: cfg.max_consecutive_failures,
            retry_backoff_initial,
            retry_backoff_max,
        }
    }
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self::from_config(&BasicConfig::default())
    }
}

enum Step {
    Done,
    Shutdown,
}

/// Pulls pages from a [`PageSource`] and hands each one to a [`LogWriter`], one at a time.
pub struct SyncEngine<S, W> {
    source: S,
    writer: W,
    state_file: Option<StateFile>,
    options: SyncOptions,
    next_checkpoint: Instant,
}

impl<S: PageSource, W: LogWriter> SyncEngine<S, W> {
    pub fn new(source: S, writer: W, state_file: Option<StateFile>, options: SyncOptions) -> Self {
        Self {
            source,
            writer,
            state_file,
            options,
            next_checkpoint: Instant::now(),
        }
    }

    pub fn into_parts(self) -> (S, W) {
        (self.source, self.writer)
    }

    /// Runs until `cancel` fires or the failure limit is reached.
    ///
    /// Returns `Ok(())` on shutdown, after a final checkpoint. Returns the last cycle error once
    /// `max_consecutive_failures` cycles in a row have failed, or a non-retryable error right
    /// away. A failed checkpoint is always fatal.
    pub async fn run(&mut self, cancel: &CancellationToken) -> Result<(), RelayError> {
        if self.state_file.is_none() {
            debug!("No state file configured, checkpoints are disabled");
        }

        let result = self.run_loop(cancel).await;
        if matches!(result, Err(RelayError::Persistence { .. })) {
            return result;
        }

        match self.checkpoint().await {
            Ok(()) => result,
            Err(err) if result.is_ok() => Err(err),
            Err(err) => {
                error!(error = %err, "Final checkpoint failed");
                result
            }
        }
    }

    async fn run_loop(&mut self, cancel: &CancellationToken) -> Result<(), RelayError> {
        let mut backoff = self.fresh_backoff();
        let mut failures: u32 = 0;

        loop {
            if Instant::now() >= self.next_checkpoint {
                self.checkpoint().await?;
                self.next_checkpoint = Instant::now() + self.options.checkpoint_interval;
            }

            let err = match self.sync_one_page(cancel).await {
                Ok(Step::Done) => {
                    if failures > 0 {
                        failures = 0;
                        backoff = self.fresh_backoff();
                    }
                    continue;
                }
                Ok(Step::Shutdown) => return Ok(()),
                Err(err) => err,
            };

            if cancel.is_cancelled() {
                debug!(error = %err, "Cycle failed during shutdown");
                return Ok(());
            }

            failures = failures.saturating_add(1);
            warn!(
                error = %err,
                trial = failures,
                max = self.options.max_consecutive_failures,
                "Sync cycle failed"
            );

            if !err.is_retryable() || failures == self.options.max_consecutive_failures {
                return Err(err);
            }

            debug!(delay = ?backoff.next_delay(), "Backing off before retrying");
            if !backoff.wait(cancel).await {
                info!("Shutdown requested during backoff");
                return Ok(());
            }
        }
    }

    fn fresh_backoff(&self) -> Backoff {
        Backoff::new(
            self.options.retry_backoff_initial,
            self.options.retry_backoff_max,
        )
    }

    async fn sync_one_page(&mut self, cancel: &CancellationToken) -> Result<Step, RelayError> {
        let logs = match self.source.next_page(cancel).await {
            Ok(logs) => logs,
            Err(RelayError::Cancelled) => return Ok(Step::Shutdown),
            Err(err) => return Err(err),
        };

        self.writer.write_logs(cancel, &logs).await?;
        debug!(count = logs.len(), "Wrote logs batch");

        if cancel.is_cancelled() {
            return Ok(Step::Shutdown);
        }
        Ok(Step::Done)
    }

    async fn checkpoint(&self) -> Result<(), RelayError> {
        let Some(state_file) = &self.state_file else {
            return Ok(());
        };
        let state = self.source.state()?;
        state_file.save(&state).await?;
        debug!(path = %state_file.path().display(), "State checkpoint saved");
        Ok(())
    }
}
