//! Per-trip outcomes and batch summaries

use serde::Serialize;
use std::time::Duration;

use trip_common::TripIdentity;

use crate::error::PipelineError;
use crate::ledger::LedgerEntry;
use crate::sink::{ArtifactInfo, StoredTrip};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TripOutcome {
    /// Already completed by an earlier run; nothing was written
    Skipped { artifact: Option<String> },
    Completed { artifact: String, rows: usize },
    Failed { kind: &'static str, error: String },
}

impl TripOutcome {
    pub fn failed(err: &PipelineError) -> Self {
        Self::Failed {
            kind: err.kind(),
            error: err.to_string(),
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Skipped { .. } => "skipped",
            Self::Completed { .. } => "completed",
            Self::Failed { .. } => "failed",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TripReport {
    pub identity: TripIdentity,
    pub outcome: TripOutcome,
    pub elapsed: Duration,
}

/// Result of a `process_all` run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    pub trips: Vec<TripReport>,
    /// Keys that did not parse, skipped
    pub malformed_keys: Vec<String>,
    /// Errors raised while enumerating keys
    pub discovery_errors: Vec<String>,
    /// The batch stopped early because it was cancelled
    pub cancelled: bool,
}

impl BatchReport {
    pub fn total(&self) -> usize {
        self.trips.len()
    }

    fn count(&self, label: &str) -> usize {
        self.trips
            .iter()
            .filter(|t| t.outcome.label() == label)
            .count()
    }

    pub fn completed(&self) -> usize {
        self.count("completed")
    }

    pub fn skipped(&self) -> usize {
        self.count("skipped")
    }

    pub fn failed(&self) -> usize {
        self.count("failed")
    }

    /// Any failed trip or an incomplete discovery.
    pub fn has_failures(&self) -> bool {
        self.failed() > 0 || !self.discovery_errors.is_empty()
    }

    pub fn get(&self, identity: &TripIdentity) -> Option<&TripReport> {
        self.trips.iter().find(|t| &t.identity == identity)
    }
}

/// Everything the stores know about one trip.
#[derive(Debug, Clone, Serialize)]
pub struct TripDetails {
    pub identity: TripIdentity,
    pub history: Vec<LedgerEntry>,
    pub stored: Option<StoredTrip>,
    pub artifacts: Vec<ArtifactInfo>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PurgeOutcome {
    Purged,
    /// Latest ledger status was not `completed` and `force` was not set
    Refused { status: Option<String> },
}
