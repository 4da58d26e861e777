//! Shared domain types
//!
//! [`TripIdentity`] is the natural key of a trip in every store the pipeline
//! touches: the source keys, the relational row, the artifact file name and the
//! processing ledger all carry it. [`ProcessingStatus`] is the ledger state.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{CommonError, Result};

/// Delimiter between key segments in the source store.
pub const KEY_DELIMITER: char = ':';

/// Length of the `YYYYMMDD` start date segment.
pub const START_DATE_LEN: usize = 8;

/// Characters a trip id may not contain: key delimiter, path separators, NUL.
const FORBIDDEN_TRIP_ID_CHARS: [char; 4] = [KEY_DELIMITER, '/', '\\', '\0'];

/// `(trip_id, start_date)` pair identifying one trip across all stores.
///
/// Construction validates the invariants, so any value of this type is safe to
/// embed in keys, file names and SQL parameters. Deserialization goes through
/// the same checks.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "IdentityFields")]
pub struct TripIdentity {
    trip_id: String,
    start_date: String,
}

impl TripIdentity {
    /// Build an identity, rejecting empty trip ids, `.` and `..`, trip ids
    /// containing the key delimiter, a path separator or NUL, and start dates
    /// that are not exactly eight ASCII digits.
    pub fn new(trip_id: impl Into<String>, start_date: impl Into<String>) -> Result<Self> {
        let trip_id = trip_id.into();
        let start_date = start_date.into();

        if trip_id.is_empty() {
            return Err(CommonError::invalid_identity("trip id is empty"));
        }

        if trip_id == "." || trip_id == ".." {
            return Err(CommonError::invalid_identity(format!(
                "trip id '{}' is reserved",
                trip_id
            )));
        }

        if let Some(c) = trip_id.chars().find(|c| FORBIDDEN_TRIP_ID_CHARS.contains(c)) {
            return Err(CommonError::invalid_identity(format!(
                "trip id '{}' contains {:?}",
                trip_id.escape_default(),
                c
            )));
        }

        if start_date.len() != START_DATE_LEN || !start_date.bytes().all(|b| b.is_ascii_digit()) {
            return Err(CommonError::invalid_identity(format!(
                "start date '{}' is not YYYYMMDD",
                start_date
            )));
        }

        Ok(Self {
            trip_id,
            start_date,
        })
    }

    pub fn trip_id(&self) -> &str {
        &self.trip_id
    }

    pub fn start_date(&self) -> &str {
        &self.start_date
    }

    /// Calendar date of the start date segment, if it names a real day.
    pub fn start_naive_date(&self) -> Option<NaiveDate> {
        NaiveDate::parse_from_str(&self.start_date, "%Y%m%d").ok()
    }
}

#[derive(Deserialize)]
struct IdentityFields {
    trip_id: String,
    start_date: String,
}

impl TryFrom<IdentityFields> for TripIdentity {
    type Error = CommonError;

    fn try_from(fields: IdentityFields) -> Result<Self> {
        Self::new(fields.trip_id, fields.start_date)
    }
}

impl fmt::Display for TripIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.trip_id, self.start_date)
    }
}

/// Ledger state of one processing attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl ProcessingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingStatus::Pending => "pending",
            ProcessingStatus::Processing => "processing",
            ProcessingStatus::Completed => "completed",
            ProcessingStatus::Failed => "failed",
        }
    }

    /// `completed` and `failed` end a processing attempt.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ProcessingStatus::Completed | ProcessingStatus::Failed)
    }
}

impl fmt::Display for ProcessingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ProcessingStatus {
    type Err = CommonError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(ProcessingStatus::Pending),
            "processing" => Ok(ProcessingStatus::Processing),
            "completed" => Ok(ProcessingStatus::Completed),
            "failed" => Ok(ProcessingStatus::Failed),
            other => Err(CommonError::InvalidStatus(other.to_string())),
        }
    }
}
