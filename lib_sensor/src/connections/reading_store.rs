//! # Reading Store
//!
//! The write path used by the ingestion loop. It owns one long-lived
//! connection and applies a strict policy on every append:
//!
//! 1. Round-trip a trivial query to check the connection is alive.
//! 2. If it is not, reconnect exactly once.
//! 3. If the reconnect fails too, report the failure and drop the reading.
//!
//! Measurements with no value at all are refused before the connection is
//! touched. The row timestamp is taken once the connection is known to be
//! good, right before the insert, so a slow reconnect does not backdate it.
//!
//! Nothing is queued for later; a dropped reading stays dropped. The insert
//! itself runs inside a transaction so a failed write leaves no row behind.
//!
//! The connection is reached through [`StoreConnector`]/[`StoreConnection`],
//! which lets the policy be exercised against scripted connections.

use async_trait::async_trait;
use tracing::{error, info, warn};

use crate::connections::db_postgres::DbError;
use crate::models::reading::{LatestData, Measurements, Reading};

const EMPTY_READING: &str = "refusing to store a reading with no values";

/// One open connection on the write side.
#[async_trait]
pub trait StoreConnection: Send {
    /// Trivial round-trip proving the connection is usable.
    async fn ping(&mut self) -> Result<(), DbError>;

    /// Creates the readings table if it does not exist.
    async fn ensure_schema(&mut self) -> Result<(), DbError>;

    /// Inserts one reading atomically and returns its row id.
    async fn insert(&mut self, reading: &Reading) -> Result<i64, DbError>;
}

/// Opens write-side connections.
#[async_trait]
pub trait StoreConnector: Send + Sync {
    type Conn: StoreConnection;

    async fn connect(&self) -> Result<Self::Conn, DbError>;
}

/// # Reading Query
///
/// The read side used by the HTTP layer. Every call acquires its own
/// connection and releases it before returning.
#[async_trait]
pub trait ReadingQuery: Send + Sync {
    /// The newest row, or `None` for an empty table.
    async fn latest(&self) -> Result<Option<LatestData>, DbError>;

    /// Up to `limit` rows, newest first.
    async fn recent(&self, limit: i64) -> Result<Vec<LatestData>, DbError>;

    /// Total number of stored rows.
    async fn count(&self) -> Result<i64, DbError>;

    /// Trivial round-trip for health checks.
    async fn ping(&self) -> Result<(), DbError>;
}

/// # Reading Store
///
/// Write-side store with a single reconnect attempt per append.
pub struct ReadingStore<C: StoreConnector> {
    connector: C,
    conn: Option<C::Conn>,
}

impl<C: StoreConnector> ReadingStore<C> {
    /// Creates an unconnected store. Call [`ReadingStore::connect`] before use.
    pub fn new(connector: C) -> Self {
        Self { connector, conn: None }
    }

    /// Opens (or replaces) the connection.
    pub async fn connect(&mut self) -> Result<(), DbError> {
        self.conn = None;
        self.conn = Some(self.connector.connect().await?);
        Ok(())
    }

    /// Creates the schema if absent. Idempotent.
    pub async fn ensure_schema(&mut self) -> Result<(), DbError> {
        let conn = self.conn.as_mut().ok_or(DbError::NotConnected)?;
        conn.ensure_schema().await?;
        info!("Table sensor_readings ready");
        Ok(())
    }

    /// `true` if the current connection answers a trivial query.
    pub async fn health_check(&mut self) -> bool {
        match self.conn.as_mut() {
            Some(conn) => conn.ping().await.is_ok(),
            None => false,
        }
    }

    /// Stamps and persists `m`, reconnecting once if the connection is gone.
    ///
    /// An `Err` means nothing was written.
    pub async fn append(&mut self, m: Measurements) -> Result<i64, DbError> {
        if m.is_empty() {
            return Err(DbError::Write(EMPTY_READING.into()));
        }

        if !self.health_check().await {
            warn!("Database connection lost, attempting one reconnect");
            if let Err(e) = self.connect().await {
                error!(error = %e, "Reconnect failed, reading dropped");
                return Err(e);
            }
            info!("Database connection re-established");
        }

        let reading = Reading::capture(m)
            .ok_or_else(|| DbError::Write(EMPTY_READING.into()))?;
        let conn = self.conn.as_mut().ok_or(DbError::NotConnected)?;
        match conn.insert(&reading).await {
            Ok(id) => {
                info!(id, at = %reading.captured_at.format("%Y-%m-%d %H:%M:%S"), "Reading stored");
                Ok(id)
            }
            Err(e) => {
                error!(error = %e, "Failed to store reading");
                Err(e)
            }
        }
    }

    /// Drops the connection.
    pub fn close(&mut self) {
        if self.conn.take().is_some() {
            info!("Database connection closed");
        }
    }
}
