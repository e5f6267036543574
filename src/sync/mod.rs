//! The fetch → write loop and its checkpoints.

mod engine;
mod state_file;

pub use engine::{SyncEngine, SyncOptions};
pub use state_file::StateFile;
