//! # Models Module
//!
//! Plain data types shared by the ingestion side and the distribution side.

/// The persisted reading, its derived status labels and the read-side views.
pub mod reading;
