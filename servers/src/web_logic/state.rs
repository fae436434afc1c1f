use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use lib_sensor::connections::ReadingQuery;
use lib_sensor::distribution::{LatestReadingCache, StreamPublisher};

/// Shared by every handler. Cloning is cheap.
#[derive(Clone)]
pub struct AppState {
    cache: Arc<LatestReadingCache>,
    stream_interval: Duration,
    // Cancelled on shutdown so open event streams end and the server can drain.
    shutdown: CancellationToken,
}

impl AppState {
    pub fn new(query: Arc<dyn ReadingQuery>, cache_ttl: Duration, stream_interval: Duration) -> Self {
        Self {
            cache: Arc::new(LatestReadingCache::new(query, cache_ttl)),
            stream_interval,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn cache(&self) -> &LatestReadingCache {
        &self.cache
    }

    pub fn query(&self) -> &Arc<dyn ReadingQuery> {
        self.cache.query()
    }

    pub fn publisher(&self) -> StreamPublisher {
        StreamPublisher::new(self.cache.clone(), self.stream_interval)
    }

    pub fn stream_interval(&self) -> Duration {
        self.stream_interval
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }
}
