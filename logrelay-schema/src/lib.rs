pub mod log;

pub use log::{Log, LogLevel, LogPage};
