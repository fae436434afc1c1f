//! # Connections Module
//!
//! This module handles persistent connections to the PostgreSQL store that
//! holds `sensor_readings`.
//!
//! The write side is a single long-lived connection owned by the ingestion
//! loop (`reading_store`). The read side borrows short-lived connections from
//! a pool, one per query (`db_postgres::PgReadingQuery`).

/// PostgreSQL connector, pooled query side and the table schema.
pub mod db_postgres;

/// The write-side store with its reconnect policy, and the store traits.
pub mod reading_store;

/// TLS connector selection for PostgreSQL connections.
pub mod tls;

pub use db_postgres::{create_pool, mask_url_password, DbError, PgConnector, PgReadingQuery};
pub use reading_store::{ReadingQuery, ReadingStore, StoreConnection, StoreConnector};
