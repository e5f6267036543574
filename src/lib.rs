pub mod backoff;
pub mod config;
pub mod error;
pub mod oauth;
pub mod sink;
pub mod source;
pub mod sync;
pub mod utils;

pub use error::RelayError;
pub use logrelay_schema::{Log, LogPage};
