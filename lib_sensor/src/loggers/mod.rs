//! # Loggers Module
//!
//! `tracing` subscriber construction shared by the sensor binaries: console
//! output, a daily rolling JSON file and cleanup of older files.

pub mod setup;

pub use setup::{init_tracing, prune_old_logs, LogError, LogSettings};
pub use tracing_appender::non_blocking::WorkerGuard;
