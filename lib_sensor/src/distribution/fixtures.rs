//! Test doubles shared by the distribution tests.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::connections::db_postgres::DbError;
use crate::connections::reading_store::ReadingQuery;
use crate::models::reading::LatestData;

/// Answers `latest` from a queue; an exhausted queue behaves like an empty table.
#[derive(Default)]
pub(crate) struct QueuedQuery {
    answers: Mutex<VecDeque<Result<Option<LatestData>, DbError>>>,
    calls: Mutex<usize>,
}

impl QueuedQuery {
    pub(crate) fn with(answers: Vec<Result<Option<LatestData>, DbError>>) -> Arc<Self> {
        Arc::new(Self {
            answers: Mutex::new(answers.into()),
            calls: Mutex::new(0),
        })
    }

    pub(crate) fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl ReadingQuery for QueuedQuery {
    async fn latest(&self) -> Result<Option<LatestData>, DbError> {
        *self.calls.lock().unwrap() += 1;
        self.answers.lock().unwrap().pop_front().unwrap_or(Ok(None))
    }

    async fn recent(&self, _limit: i64) -> Result<Vec<LatestData>, DbError> {
        Ok(Vec::new())
    }

    async fn count(&self) -> Result<i64, DbError> {
        Ok(0)
    }

    async fn ping(&self) -> Result<(), DbError> {
        Ok(())
    }
}

pub(crate) fn data(ts: &str) -> LatestData {
    LatestData {
        timestamp: Some(ts.to_string()),
        ph_value: Some("7.02".into()),
        orp_value: Some("350".into()),
        ntu_value: None,
    }
}
