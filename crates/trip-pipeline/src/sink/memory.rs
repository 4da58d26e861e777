//! In-memory trip sink for tests and dry runs

use async_trait::async_trait;
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use super::{StoredTrip, TripSink};
use crate::error::PipelineResult;
use crate::mapper::TripCompletion;

#[derive(Default)]
struct Inner {
    rows: BTreeMap<String, StoredTrip>,
    upserts: usize,
}

/// Behaves like the `trips` table: one row per trip id, `created_at` kept on
/// update, `updated_at` bumped.
#[derive(Clone, Default)]
pub struct InMemoryTripSink {
    inner: Arc<Mutex<Inner>>,
}

impl InMemoryTripSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn row_count(&self) -> usize {
        self.inner.lock().await.rows.len()
    }

    /// Number of successful upserts so far.
    pub async fn upsert_count(&self) -> usize {
        self.inner.lock().await.upserts
    }
}

#[async_trait]
impl TripSink for InMemoryTripSink {
    async fn upsert(&self, completion: &TripCompletion) -> PipelineResult<()> {
        let now = Utc::now();
        let mut inner = self.inner.lock().await;
        let created_at = inner
            .rows
            .get(&completion.trip_id)
            .map(|row| row.created_at)
            .unwrap_or(now);

        inner.rows.insert(
            completion.trip_id.clone(),
            StoredTrip {
                trip: completion.clone(),
                created_at,
                updated_at: now,
            },
        );
        inner.upserts += 1;
        Ok(())
    }

    async fn fetch(&self, trip_id: &str) -> PipelineResult<Option<StoredTrip>> {
        Ok(self.inner.lock().await.rows.get(trip_id).cloned())
    }
}
