//! # Latest Reading Cache
//!
//! A time-boxed cache in front of [`ReadingQuery::latest`]. Every stream
//! client and every `/data` request goes through the same instance, so a
//! burst of clients costs at most one store query per TTL window.
//!
//! ## Behavior
//! - A fresh entry (younger than the TTL) is returned without touching the store.
//! - Otherwise the store is queried and the result replaces the entry.
//! - A failed query returns the error and leaves the previous entry in place.
//! - An empty table is reported as `Ok(None)` and is not cached.
//!
//! Concurrent refreshes may both hit the store; the last one to finish wins.
//! Entries are swapped whole, so readers never see a half-written entry.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::debug;

use crate::connections::db_postgres::DbError;
use crate::connections::reading_store::ReadingQuery;
use crate::models::reading::LatestSnapshot;

/// Default lifetime of a cached entry.
pub const DEFAULT_TTL: Duration = Duration::from_secs(5);

struct CacheEntry {
    snapshot: LatestSnapshot,
    cached_at: Instant,
}

/// # Latest Reading Cache
pub struct LatestReadingCache {
    query: Arc<dyn ReadingQuery>,
    ttl: Duration,
    entry: RwLock<Option<Arc<CacheEntry>>>,
}

impl LatestReadingCache {
    pub fn new(query: Arc<dyn ReadingQuery>, ttl: Duration) -> Self {
        Self {
            query,
            ttl,
            entry: RwLock::new(None),
        }
    }

    /// The backing query handle, for calls the cache does not cover.
    pub fn query(&self) -> &Arc<dyn ReadingQuery> {
        &self.query
    }

    /// Returns the latest snapshot, from cache when fresh.
    pub async fn get(&self) -> Result<Option<LatestSnapshot>, DbError> {
        if let Some(entry) = self.fresh_entry().await {
            debug!("Latest reading served from cache");
            return Ok(Some(entry.snapshot.clone()));
        }

        let Some(latest) = self.query.latest().await? else {
            return Ok(None);
        };

        let snapshot = LatestSnapshot::fetched_now(latest);
        let entry = Arc::new(CacheEntry {
            snapshot: snapshot.clone(),
            cached_at: Instant::now(),
        });
        *self.entry.write().await = Some(entry);
        Ok(Some(snapshot))
    }

    async fn fresh_entry(&self) -> Option<Arc<CacheEntry>> {
        let guard = self.entry.read().await;
        guard
            .as_ref()
            .filter(|entry| entry.cached_at.elapsed() < self.ttl)
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distribution::fixtures::{data, QueuedQuery};

    #[tokio::test(start_paused = true)]
    async fn second_get_within_ttl_does_not_query() {
        let query = QueuedQuery::with(vec![Ok(Some(data("2024-01-01T00:00:00")))]);
        let cache = LatestReadingCache::new(query.clone(), DEFAULT_TTL);

        let first = cache.get().await.unwrap().unwrap();
        tokio::time::advance(Duration::from_secs(4)).await;
        let second = cache.get().await.unwrap().unwrap();

        assert_eq!(first, second);
        assert_eq!(query.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_entry_is_refetched() {
        let query = QueuedQuery::with(vec![
            Ok(Some(data("2024-01-01T00:00:00"))),
            Ok(Some(data("2024-01-01T00:00:05"))),
        ]);
        let cache = LatestReadingCache::new(query.clone(), DEFAULT_TTL);

        cache.get().await.unwrap();
        tokio::time::advance(Duration::from_secs(5)).await;
        let refreshed = cache.get().await.unwrap().unwrap();

        assert_eq!(refreshed.latest_data.timestamp.as_deref(), Some("2024-01-01T00:00:05"));
        assert_eq!(query.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn failure_does_not_poison_the_entry() {
        let query = QueuedQuery::with(vec![
            Ok(Some(data("2024-01-01T00:00:00"))),
            Err(DbError::Query("boom".into())),
            Ok(Some(data("2024-01-01T00:00:10"))),
        ]);
        let cache = LatestReadingCache::new(query.clone(), DEFAULT_TTL);

        cache.get().await.unwrap();
        tokio::time::advance(Duration::from_secs(6)).await;
        assert!(cache.get().await.is_err());

        // The old entry was kept, not replaced by the failure.
        assert!(cache.entry.read().await.is_some());
        let next = cache.get().await.unwrap().unwrap();
        assert_eq!(next.latest_data.timestamp.as_deref(), Some("2024-01-01T00:00:10"));
    }

    #[tokio::test(start_paused = true)]
    async fn empty_table_is_not_cached() {
        let query = QueuedQuery::with(vec![Ok(None), Ok(Some(data("2024-01-01T00:00:00")))]);
        let cache = LatestReadingCache::new(query.clone(), DEFAULT_TTL);

        assert!(cache.get().await.unwrap().is_none());
        assert!(cache.get().await.unwrap().is_some());
        assert_eq!(query.calls(), 2);
    }
}
