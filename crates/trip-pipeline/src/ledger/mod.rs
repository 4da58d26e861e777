//! Processing ledger
//!
//! An append-only log of processing attempts per trip. Every status change is
//! a new entry; the current state of a trip is simply its latest entry. Since
//! nothing is ever updated in place, concurrent claims of the same trip cannot
//! conflict.
//!
//! ```text
//! pending -> processing -> completed
//!                       \-> failed -> processing -> ...
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use trip_common::{ProcessingStatus, TripIdentity};

use crate::error::PipelineResult;

pub mod memory;
pub mod postgres;

pub use memory::InMemoryLedger;
pub use postgres::PgLedger;

/// One row of the ledger.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LedgerEntry {
    pub trip_id: String,
    pub start_date: String,
    pub status: ProcessingStatus,
    pub artifact_path: Option<String>,
    pub error_message: Option<String>,
    pub processed_at: DateTime<Utc>,
}

#[async_trait]
pub trait ProcessingLedger: Send + Sync {
    /// Append an entry. The only write operation.
    async fn record(
        &self,
        identity: &TripIdentity,
        status: ProcessingStatus,
        artifact_path: Option<&str>,
        error_message: Option<&str>,
    ) -> PipelineResult<()>;

    /// Most recent entry, if the trip was ever seen.
    async fn latest_status(&self, identity: &TripIdentity) -> PipelineResult<Option<LedgerEntry>>;

    /// All entries, oldest first.
    async fn history(&self, identity: &TripIdentity) -> PipelineResult<Vec<LedgerEntry>>;

    /// Mark the trip as being processed. Re-claiming is allowed.
    async fn claim(&self, identity: &TripIdentity) -> PipelineResult<()> {
        self.record(identity, ProcessingStatus::Processing, None, None)
            .await
    }

    async fn complete(&self, identity: &TripIdentity, artifact_path: &str) -> PipelineResult<()> {
        self.record(
            identity,
            ProcessingStatus::Completed,
            Some(artifact_path),
            None,
        )
        .await
    }

    async fn fail(&self, identity: &TripIdentity, error_message: &str) -> PipelineResult<()> {
        self.record(identity, ProcessingStatus::Failed, None, Some(error_message))
            .await
    }
}
