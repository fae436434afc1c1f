//! # Distribution Module
//!
//! The read side that faces web clients: a shared, time-boxed cache of the
//! newest reading and the per-client publisher that turns it into a stream of
//! change events.

/// Time-boxed cache of the latest reading.
pub mod latest_cache;

/// Change detection and the per-client event stream.
pub mod change_detector;

#[cfg(test)]
mod fixtures;

pub use change_detector::{identity_key, ChangeDetector, StreamEvent, StreamPublisher};
pub use latest_cache::LatestReadingCache;
