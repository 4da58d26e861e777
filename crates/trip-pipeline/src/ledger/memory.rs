//! In-memory ledger for tests and dry runs

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::Mutex;

use trip_common::{ProcessingStatus, TripIdentity};

use super::{LedgerEntry, ProcessingLedger};
use crate::error::PipelineResult;

#[derive(Clone, Default)]
pub struct InMemoryLedger {
    entries: Arc<Mutex<Vec<LedgerEntry>>>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries across all trips.
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}

fn matches(entry: &LedgerEntry, identity: &TripIdentity) -> bool {
    entry.trip_id == identity.trip_id() && entry.start_date == identity.start_date()
}

#[async_trait]
impl ProcessingLedger for InMemoryLedger {
    async fn record(
        &self,
        identity: &TripIdentity,
        status: ProcessingStatus,
        artifact_path: Option<&str>,
        error_message: Option<&str>,
    ) -> PipelineResult<()> {
        self.entries.lock().await.push(LedgerEntry {
            trip_id: identity.trip_id().to_string(),
            start_date: identity.start_date().to_string(),
            status,
            artifact_path: artifact_path.map(str::to_string),
            error_message: error_message.map(str::to_string),
            processed_at: Utc::now(),
        });
        Ok(())
    }

    async fn latest_status(&self, identity: &TripIdentity) -> PipelineResult<Option<LedgerEntry>> {
        Ok(self
            .entries
            .lock()
            .await
            .iter()
            .rev()
            .find(|e| matches(e, identity))
            .cloned())
    }

    async fn history(&self, identity: &TripIdentity) -> PipelineResult<Vec<LedgerEntry>> {
        Ok(self
            .entries
            .lock()
            .await
            .iter()
            .filter(|e| matches(e, identity))
            .cloned()
            .collect())
    }
}
