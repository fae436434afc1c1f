//! # Project Test Fixtures
//!
//! In-memory stand-ins for the two outside collaborators of the sensor
//! pipeline, used by the end-to-end tests in `tests/`:
//! - [`ScriptedLineSource`]: replays canned serial frames.
//! - [`MemoryStore`]: one table shared by the write side (`StoreConnector`)
//!   and the read side (`ReadingQuery`), with switchable outages.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

use lib_sensor::connections::{DbError, ReadingQuery, StoreConnection, StoreConnector};
use lib_sensor::ingestors::{LineSource, SerialError};
use lib_sensor::models::reading::iso_timestamp;
use lib_sensor::{LatestData, Reading};

/// Replays frames in order, then reports an idle link.
pub struct ScriptedLineSource {
    frames: VecDeque<Vec<u8>>,
    cancel_when_drained: Option<CancellationToken>,
    closed: Arc<AtomicBool>,
}

impl ScriptedLineSource {
    /// One CRLF-terminated frame per line.
    pub fn from_lines(lines: &[&str]) -> Self {
        Self::from_frames(lines.iter().map(|l| format!("{}\r\n", l).into_bytes()).collect())
    }

    pub fn from_frames(frames: Vec<Vec<u8>>) -> Self {
        Self {
            frames: frames.into(),
            cancel_when_drained: None,
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Cancels `token` the first time the source runs dry.
    pub fn stop_when_drained(mut self, token: CancellationToken) -> Self {
        self.cancel_when_drained = Some(token);
        self
    }

    /// Flag set once the ingestion loop closes the source.
    pub fn closed_flag(&self) -> Arc<AtomicBool> {
        self.closed.clone()
    }
}

#[async_trait]
impl LineSource for ScriptedLineSource {
    async fn next_frame(&mut self) -> Result<Option<Vec<u8>>, SerialError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(SerialError::Closed);
        }
        let frame = self.frames.pop_front();
        if frame.is_none() {
            if let Some(token) = &self.cancel_when_drained {
                token.cancel();
            }
        }
        Ok(frame)
    }

    async fn flush_input(&mut self) -> Result<(), SerialError> {
        Ok(())
    }

    async fn close(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

#[derive(Default)]
struct Shared {
    rows: Mutex<Vec<Reading>>,
    // Next connect attempts to refuse.
    refuse_connects: AtomicUsize,
    connects: AtomicUsize,
    // Makes live connections fail their ping once each.
    drop_connections: AtomicBool,
    // Read side outage.
    reads_down: AtomicBool,
}

/// A shared in-memory `sensor_readings` table.
#[derive(Clone, Default)]
pub struct MemoryStore {
    shared: Arc<Shared>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rows(&self) -> Vec<Reading> {
        self.shared.rows.lock().map(|rows| rows.clone()).unwrap_or_default()
    }

    pub fn connects(&self) -> usize {
        self.shared.connects.load(Ordering::SeqCst)
    }

    /// Refuses the next `n` connection attempts.
    pub fn refuse_connects(&self, n: usize) {
        self.shared.refuse_connects.store(n, Ordering::SeqCst);
    }

    /// Breaks the current write connection; its next ping fails.
    pub fn drop_connection(&self) {
        self.shared.drop_connections.store(true, Ordering::SeqCst);
    }

    pub fn set_reads_down(&self, down: bool) {
        self.shared.reads_down.store(down, Ordering::SeqCst);
    }

    /// Renders a row the way the database renders it for readers.
    pub fn render(reading: &Reading) -> LatestData {
        LatestData {
            timestamp: Some(iso_timestamp(reading.captured_at)),
            ph_value: reading.acidity.map(|v| format!("{:.2}", v)),
            orp_value: reading.redox.map(|v| v.to_string()),
            ntu_value: reading.turbidity.map(|v| v.to_string()),
        }
    }

    fn newest_first(&self) -> Vec<Reading> {
        let mut rows = self.rows();
        // Stable sort keeps insertion order among equal timestamps; newest inserted wins.
        rows.reverse();
        rows.sort_by(|a, b| b.captured_at.cmp(&a.captured_at));
        rows
    }

    fn check_reads(&self) -> Result<(), DbError> {
        if self.shared.reads_down.load(Ordering::SeqCst) {
            return Err(DbError::Connection("read side unavailable".into()));
        }
        Ok(())
    }
}

pub struct MemoryConnection {
    shared: Arc<Shared>,
}

#[async_trait]
impl StoreConnector for MemoryStore {
    type Conn = MemoryConnection;

    async fn connect(&self) -> Result<MemoryConnection, DbError> {
        self.shared.connects.fetch_add(1, Ordering::SeqCst);
        let refused = self
            .shared
            .refuse_connects
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if refused {
            return Err(DbError::Connection("connection refused".into()));
        }
        Ok(MemoryConnection {
            shared: self.shared.clone(),
        })
    }
}

#[async_trait]
impl StoreConnection for MemoryConnection {
    async fn ping(&mut self) -> Result<(), DbError> {
        if self.shared.drop_connections.swap(false, Ordering::SeqCst) {
            return Err(DbError::Query("server closed the connection unexpectedly".into()));
        }
        Ok(())
    }

    async fn ensure_schema(&mut self) -> Result<(), DbError> {
        Ok(())
    }

    async fn insert(&mut self, reading: &Reading) -> Result<i64, DbError> {
        let mut rows = self
            .shared
            .rows
            .lock()
            .map_err(|_| DbError::Write("table lock poisoned".into()))?;
        rows.push(reading.clone());
        Ok(rows.len() as i64)
    }
}

#[async_trait]
impl ReadingQuery for MemoryStore {
    async fn latest(&self) -> Result<Option<LatestData>, DbError> {
        self.check_reads()?;
        Ok(self.newest_first().first().map(Self::render))
    }

    async fn recent(&self, limit: i64) -> Result<Vec<LatestData>, DbError> {
        self.check_reads()?;
        let limit = usize::try_from(limit).unwrap_or(0);
        Ok(self.newest_first().iter().take(limit).map(Self::render).collect())
    }

    async fn count(&self) -> Result<i64, DbError> {
        self.check_reads()?;
        Ok(self.rows().len() as i64)
    }

    async fn ping(&self) -> Result<(), DbError> {
        self.check_reads()
    }
}
