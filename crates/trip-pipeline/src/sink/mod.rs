//! Durable sinks
//!
//! - [`TripSink`]: trip metadata, one row per trip, upserted
//! - [`TrackSink`]: the track of one trip, one Parquet artifact per run
//! - [`ArtifactArchive`]: optional copy of an artifact into object storage

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;

use trip_common::TripIdentity;

use crate::error::PipelineResult;
use crate::mapper::{TrackPoint, TripCompletion};

pub mod archive;
pub mod columnar;
pub mod memory;
pub mod relational;

pub use archive::S3Archive;
pub use columnar::ParquetTrackWriter;
pub use memory::InMemoryTripSink;
pub use relational::PgTripSink;

/// A trip row as read back from the relational store.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredTrip {
    pub trip: TripCompletion,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A freshly written columnar artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub path: PathBuf,
    pub rows: usize,
    pub size_bytes: u64,
}

/// Summary of an artifact on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactInfo {
    pub path: PathBuf,
    pub rows: i64,
    pub size_bytes: u64,
    pub columns: Vec<String>,
}

#[async_trait]
pub trait TripSink: Send + Sync {
    /// Insert or replace the row for `completion.trip_id` in one transaction.
    async fn upsert(&self, completion: &TripCompletion) -> PipelineResult<()>;

    async fn fetch(&self, trip_id: &str) -> PipelineResult<Option<StoredTrip>>;
}

#[async_trait]
pub trait TrackSink: Send + Sync {
    /// Write all points into a new artifact. Never overwrites an earlier one.
    async fn write_track(
        &self,
        identity: &TripIdentity,
        points: &[TrackPoint],
    ) -> PipelineResult<Artifact>;

    /// Artifacts previously written for a trip, oldest first.
    async fn list_artifacts(&self, identity: &TripIdentity) -> PipelineResult<Vec<ArtifactInfo>>;
}

#[async_trait]
pub trait ArtifactArchive: Send + Sync {
    /// Upload the artifact and return its archived location.
    async fn archive(&self, identity: &TripIdentity, artifact: &Artifact) -> PipelineResult<String>;
}
