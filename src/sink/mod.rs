//! Destinations for relayed records.

mod bulk;
mod console;

pub use bulk::BulkIndexWriter;
pub use console::ConsoleWriter;

use async_trait::async_trait;
use logrelay_schema::Log;
use tokio_util::sync::CancellationToken;

use crate::error::SinkError;

/// The only thing the sync engine needs from a destination.
///
/// Writes must be idempotent per record (`Log::uuid`) so a retried batch causes no duplicates.
#[async_trait]
pub trait LogWriter: Send {
    /// Accepts one ordered batch; success means the destination took responsibility for it.
    async fn write_logs(&mut self, cancel: &CancellationToken, logs: &[Log])
    -> Result<(), SinkError>;

    /// Flushes anything still buffered. Called once by the process wiring before exit.
    async fn close(&mut self) -> Result<(), SinkError> {
        Ok(())
    }
}

#[async_trait]
impl<W: LogWriter + ?Sized> LogWriter for Box<W> {
    async fn write_logs(
        &mut self,
        cancel: &CancellationToken,
        logs: &[Log],
    ) -> Result<(), SinkError> {
        (**self).write_logs(cancel, logs).await
    }

    async fn close(&mut self) -> Result<(), SinkError> {
        (**self).close().await
    }
}
