//! # lib_sensor
//!
//! Shared library for the sensor station. A serial-attached water-quality sensor
//! prints free-form text lines; this crate turns those lines into persisted
//! readings and serves the latest one back out to web clients.
//!
//! ## Modules:
//! - **`models`**: the `Reading` row and its frozen status labels.
//! - **`ingestors`**: byte decoding, measurement extraction, range validation,
//!   the serial line source and the ingestion loop.
//! - **`connections`**: the PostgreSQL reading store (write side with
//!   reconnect-on-failure) and the pooled query side.
//! - **`distribution`**: the time-boxed latest-reading cache and the change-detecting
//!   stream publisher.
//! - **`loggers`**: `tracing` subscriber setup shared by the binaries.

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms, unused_qualifications)]

pub mod models;

#[cfg(feature = "connections")]
pub mod connections;

#[cfg(feature = "ingestors")]
pub mod ingestors;

#[cfg(feature = "distribution")]
pub mod distribution;

#[cfg(feature = "loggers")]
pub mod loggers;

// Re-export the types most callers need.
pub use models::reading::{AcidityStatus, LatestData, LatestSnapshot, Measurements, Reading, RedoxStatus};
