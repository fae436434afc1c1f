//! # Change Detector and Stream Publisher
//!
//! Each streaming client gets its own publisher: a polling loop that asks the
//! shared [`LatestReadingCache`] for the newest reading on a fixed interval and
//! yields an event only when the reading changed since the last one sent to
//! that client.
//!
//! ## Identity
//! A reading is identified by its timestamp. If it has none, a SHA-256
//! fingerprint of its JSON form is used instead.
//!
//! ## Errors
//! A failed lookup yields an error event on every interval. Errors are never
//! deduplicated and never touch the last delivered key, so the next good
//! reading after an outage is only resent if it actually changed.
//!
//! The publisher is a plain `Stream`; dropping it (client disconnect) ends it.

use chrono::Local;
use futures_util::stream::{self, Stream};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, Interval, MissedTickBehavior};
use tracing::{debug, warn};

use crate::distribution::latest_cache::LatestReadingCache;
use crate::models::reading::{iso_timestamp, LatestData};

/// Default polling interval per client.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(5);

/// One message pushed to a stream client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum StreamEvent {
    Update {
        latest_data: LatestData,
        timestamp: String,
        status: &'static str,
    },
    Error {
        error: String,
        timestamp: String,
    },
}

impl StreamEvent {
    pub fn update(latest_data: LatestData) -> Self {
        Self::Update {
            latest_data,
            timestamp: now_iso(),
            status: "success",
        }
    }

    pub fn error(error: impl Into<String>) -> Self {
        Self::Error {
            error: error.into(),
            timestamp: now_iso(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }
}

fn now_iso() -> String {
    iso_timestamp(Local::now().naive_local())
}

/// The key used to decide whether `data` was already delivered.
pub fn identity_key(data: &LatestData) -> String {
    match data.timestamp.as_deref() {
        Some(ts) if !ts.is_empty() => ts.to_string(),
        _ => fingerprint(data),
    }
}

/// SHA-256 hex digest of the JSON form of `data`.
pub fn fingerprint(data: &LatestData) -> String {
    let json = serde_json::to_vec(data).unwrap_or_default();
    hex::encode(Sha256::digest(&json))
}

/// # Change Detector
///
/// Remembers the last key delivered to one client.
#[derive(Debug, Default, Clone)]
pub struct ChangeDetector {
    last_key: Option<String>,
}

impl ChangeDetector {
    /// Returns `true` and records the key if `data` differs from the last delivery.
    pub fn observe(&mut self, data: &LatestData) -> bool {
        let key = identity_key(data);
        if self.last_key.as_deref() == Some(key.as_str()) {
            return false;
        }
        self.last_key = Some(key);
        true
    }

    pub fn last_key(&self) -> Option<&str> {
        self.last_key.as_deref()
    }
}

/// # Stream Publisher
///
/// Builds the per-client event stream.
#[derive(Clone)]
pub struct StreamPublisher {
    cache: Arc<LatestReadingCache>,
    interval: Duration,
}

impl StreamPublisher {
    pub fn new(cache: Arc<LatestReadingCache>, interval: Duration) -> Self {
        Self { cache, interval }
    }

    /// One polling step. `None` means there is nothing new to send.
    pub async fn poll_once(&self, detector: &mut ChangeDetector) -> Option<StreamEvent> {
        match self.cache.get().await {
            Ok(Some(snapshot)) => {
                if detector.observe(&snapshot.latest_data) {
                    Some(StreamEvent::update(snapshot.latest_data))
                } else {
                    None
                }
            }
            Ok(None) => {
                debug!("No readings stored yet");
                None
            }
            Err(e) => {
                warn!(error = %e, "Stream lookup failed");
                Some(StreamEvent::error(format!("Failed to read latest data: {}", e)))
            }
        }
    }

    /// The event stream. The first lookup happens immediately.
    pub fn into_stream(self) -> impl Stream<Item = StreamEvent> + Send {
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        stream::unfold(
            (self, ChangeDetector::default(), ticker),
            |(publisher, mut detector, mut ticker): (Self, ChangeDetector, Interval)| async move {
                loop {
                    ticker.tick().await;
                    if let Some(event) = publisher.poll_once(&mut detector).await {
                        return Some((event, (publisher, detector, ticker)));
                    }
                }
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connections::db_postgres::DbError;
    use crate::distribution::fixtures::{data, QueuedQuery};
    use futures_util::StreamExt;

    fn publisher(query: Arc<QueuedQuery>) -> StreamPublisher {
        // A zero TTL makes every poll reach the query.
        let cache = Arc::new(LatestReadingCache::new(query, Duration::ZERO));
        StreamPublisher::new(cache, DEFAULT_INTERVAL)
    }

    #[test]
    fn timestamp_is_the_identity() {
        assert_eq!(identity_key(&data("2024-01-01T00:00:00")), "2024-01-01T00:00:00");
    }

    #[test]
    fn missing_timestamp_falls_back_to_fingerprint() {
        let mut a = data("x");
        a.timestamp = None;
        let mut b = a.clone();
        b.orp_value = Some("351".into());

        assert_eq!(identity_key(&a).len(), 64);
        assert_eq!(identity_key(&a), identity_key(&a.clone()));
        assert_ne!(identity_key(&a), identity_key(&b));
    }

    #[test]
    fn detector_ignores_repeats() {
        let mut detector = ChangeDetector::default();
        assert!(detector.observe(&data("t1")));
        assert!(!detector.observe(&data("t1")));
        assert!(detector.observe(&data("t2")));
        assert_eq!(detector.last_key(), Some("t2"));
    }

    #[test]
    fn events_serialize_flat() {
        let update = serde_json::to_value(StreamEvent::update(data("t1"))).unwrap();
        assert_eq!(update["status"], "success");
        assert_eq!(update["latest_data"]["ph_value"], "7.02");
        assert!(update["timestamp"].is_string());

        let error = serde_json::to_value(StreamEvent::error("down")).unwrap();
        assert_eq!(error["error"], "down");
        assert!(error.get("status").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn one_event_per_distinct_timestamp() {
        let query = QueuedQuery::with(vec![
            Ok(Some(data("t1"))),
            Ok(Some(data("t1"))),
            Ok(Some(data("t1"))),
            Ok(Some(data("t2"))),
            Ok(Some(data("t2"))),
            Ok(Some(data("t3"))),
        ]);
        let events: Vec<_> = publisher(query.clone()).into_stream().take(3).collect().await;

        let keys: Vec<_> = events
            .iter()
            .map(|e| match e {
                StreamEvent::Update { latest_data, .. } => latest_data.timestamp.clone(),
                StreamEvent::Error { .. } => None,
            })
            .collect();
        assert_eq!(keys, vec![Some("t1".into()), Some("t2".into()), Some("t3".into())]);
        assert_eq!(query.calls(), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn errors_repeat_and_keep_the_last_key() {
        let query = QueuedQuery::with(vec![
            Ok(Some(data("t1"))),
            Err(DbError::Query("down".into())),
            Err(DbError::Query("down".into())),
            Ok(Some(data("t1"))),
            Ok(Some(data("t2"))),
        ]);
        let events: Vec<_> = publisher(query).into_stream().take(4).collect().await;

        assert!(!events[0].is_error());
        assert!(events[1].is_error());
        assert!(events[2].is_error());
        // t1 after the outage is not resent.
        match &events[3] {
            StreamEvent::Update { latest_data, .. } => {
                assert_eq!(latest_data.timestamp.as_deref(), Some("t2"))
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn first_poll_is_immediate() {
        let query = QueuedQuery::with(vec![Ok(Some(data("t1")))]);
        let start = tokio::time::Instant::now();
        let mut stream = Box::pin(publisher(query).into_stream());

        assert!(stream.next().await.is_some());
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test]
    async fn poll_once_skips_an_empty_table() {
        let query = QueuedQuery::with(vec![Ok(None)]);
        let mut detector = ChangeDetector::default();
        assert!(publisher(query).poll_once(&mut detector).await.is_none());
        assert!(detector.last_key().is_none());
    }
}
