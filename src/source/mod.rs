//! Paginated log source: the authorized transport, the durable cursor state, and the client
//! that walks the pages.

mod client;
mod state;
mod transport;

pub use client::{SourceClient, first_page_url};
pub use state::{STATE_VERSION, SavedState, connection_hash};
pub use transport::AuthorizedTransport;

use async_trait::async_trait;
use logrelay_schema::Log;
use tokio_util::sync::CancellationToken;

use crate::error::RelayError;

/// Where the sync engine pulls batches from.
#[async_trait]
pub trait PageSource: Send {
    /// Blocks until a non-empty page is available and returns its records, advancing the
    /// cursor. Returns [`RelayError::Cancelled`] once `cancel` fires.
    async fn next_page(&mut self, cancel: &CancellationToken) -> Result<Vec<Log>, RelayError>;

    /// Serialized resumption state; never blocks on I/O.
    fn state(&self) -> Result<Vec<u8>, RelayError>;
}
