//! Shared fixtures for pipeline integration tests
//!
//! Builds a [`Pipeline`] over in-memory source/ledger/trip stores and a real
//! Parquet writer in a temporary directory, plus sink wrappers that count or
//! fail writes on demand.

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;
use tokio::sync::{mpsc, Semaphore};

use trip_common::TripIdentity;
use trip_pipeline::config::PipelineSettings;
use trip_pipeline::error::{PipelineError, PipelineResult};
use trip_pipeline::ledger::InMemoryLedger;
use trip_pipeline::mapper::{TrackPoint, TripCompletion};
use trip_pipeline::pipeline::Pipeline;
use trip_pipeline::sink::{
    Artifact, ArtifactInfo, InMemoryTripSink, ParquetTrackWriter, StoredTrip, TrackSink, TripSink,
};
use trip_pipeline::source::{InMemorySourceStore, RawEntry, RawRecord};

pub fn identity(trip: &str, date: &str) -> TripIdentity {
    TripIdentity::new(trip, date).expect("valid identity")
}

pub fn fast_settings() -> PipelineSettings {
    PipelineSettings {
        concurrency: 2,
        max_retries: 2,
        retry_backoff_ms: 1,
        operation_timeout_secs: 5,
    }
}

pub fn completion_record(trip: &str) -> RawRecord {
    [
        ("trip_id", json!(trip)),
        ("vehicle_id", json!("BUS-042")),
        ("route_id", json!("R12")),
        ("distance_km", json!("12.4")),
        ("duration_minutes", json!("35")),
        ("passenger_count", json!("18")),
        ("start_time", json!("2025-09-01T08:00:00Z")),
        ("end_time", json!("2025-09-01T08:35:00Z")),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect()
}

pub fn track_entries(count: usize) -> Vec<RawEntry> {
    (0..count)
        .map(|i| {
            RawEntry::new(
                format!("{}-0", 1_756_713_600_000u64 + i as u64 * 5_000),
                [
                    ("latitude".to_string(), format!("{:.4}", -33.45 + i as f64 * 0.001)),
                    ("longitude".to_string(), format!("{:.4}", -70.66 - i as f64 * 0.001)),
                    ("speed".to_string(), "28.5".to_string()),
                ],
            )
        })
        .collect()
}

/// Counts writes and delegates to the real Parquet writer.
pub struct CountingTrackSink {
    inner: ParquetTrackWriter,
    pub writes: AtomicUsize,
}

impl CountingTrackSink {
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TrackSink for CountingTrackSink {
    async fn write_track(
        &self,
        identity: &TripIdentity,
        points: &[TrackPoint],
    ) -> PipelineResult<Artifact> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.write_track(identity, points).await
    }

    async fn list_artifacts(&self, identity: &TripIdentity) -> PipelineResult<Vec<ArtifactInfo>> {
        self.inner.list_artifacts(identity).await
    }
}

/// Track sink that parks every write until [`GatedTrackSink::release`] hands
/// out permits. Each parked write announces its trip on the channel returned
/// by [`GatedTrackSink::new`].
pub struct GatedTrackSink {
    inner: ParquetTrackWriter,
    entered: mpsc::UnboundedSender<TripIdentity>,
    gate: Semaphore,
}

impl GatedTrackSink {
    pub fn new(inner: ParquetTrackWriter) -> (Self, mpsc::UnboundedReceiver<TripIdentity>) {
        let (entered, rx) = mpsc::unbounded_channel();
        let sink = Self {
            inner,
            entered,
            gate: Semaphore::new(0),
        };
        (sink, rx)
    }

    pub fn release(&self, writes: usize) {
        self.gate.add_permits(writes);
    }
}

#[async_trait]
impl TrackSink for GatedTrackSink {
    async fn write_track(
        &self,
        identity: &TripIdentity,
        points: &[TrackPoint],
    ) -> PipelineResult<Artifact> {
        let _ = self.entered.send(identity.clone());
        let _permit = self.gate.acquire().await.expect("gate closed");
        self.inner.write_track(identity, points).await
    }

    async fn list_artifacts(&self, identity: &TripIdentity) -> PipelineResult<Vec<ArtifactInfo>> {
        self.inner.list_artifacts(identity).await
    }
}

/// How [`ScriptedTripSink`] should fail.
#[derive(Clone, Copy)]
pub enum Failure {
    /// Fail the first `n` upserts with a transport error
    Transient(usize),
    /// Reject every upsert as a constraint violation
    Reject,
}

/// Trip sink that fails according to a script, then delegates.
pub struct ScriptedTripSink {
    inner: InMemoryTripSink,
    failure: Failure,
    pub calls: AtomicUsize,
}

impl ScriptedTripSink {
    pub fn new(failure: Failure) -> Self {
        Self {
            inner: InMemoryTripSink::new(),
            failure,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TripSink for ScriptedTripSink {
    async fn upsert(&self, completion: &TripCompletion) -> PipelineResult<()> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        match self.failure {
            Failure::Transient(n) if call < n => {
                Err(PipelineError::unavailable("postgres", "connection reset by peer"))
            }
            Failure::Reject => Err(PipelineError::constraint(
                "new row violates check constraint \"trips_distance_km_check\"",
            )),
            _ => self.inner.upsert(completion).await,
        }
    }

    async fn fetch(&self, trip_id: &str) -> PipelineResult<Option<StoredTrip>> {
        self.inner.fetch(trip_id).await
    }
}

pub struct Harness {
    pub dir: TempDir,
    pub source: InMemorySourceStore,
    pub ledger: InMemoryLedger,
    pub trips: InMemoryTripSink,
    pub tracks: Arc<CountingTrackSink>,
}

impl Harness {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("temp dir");
        let writer = ParquetTrackWriter::new(dir.path()).expect("writer");
        Self {
            dir,
            source: InMemorySourceStore::default(),
            ledger: InMemoryLedger::new(),
            trips: InMemoryTripSink::new(),
            tracks: Arc::new(CountingTrackSink {
                inner: writer,
                writes: AtomicUsize::new(0),
            }),
        }
    }

    pub fn pipeline(&self) -> Pipeline {
        self.pipeline_with(Arc::new(self.trips.clone()))
    }

    pub fn pipeline_with(&self, trips: Arc<dyn TripSink>) -> Pipeline {
        Pipeline::new(
            Arc::new(self.source.clone()),
            Arc::new(self.ledger.clone()),
            trips,
            self.tracks.clone(),
            fast_settings(),
        )
    }

    pub fn pipeline_with_tracks(&self, tracks: Arc<dyn TrackSink>) -> Pipeline {
        Pipeline::new(
            Arc::new(self.source.clone()),
            Arc::new(self.ledger.clone()),
            Arc::new(self.trips.clone()),
            tracks,
            fast_settings(),
        )
    }

    /// A second writer into the same output directory.
    pub fn writer(&self) -> ParquetTrackWriter {
        ParquetTrackWriter::new(self.dir.path()).expect("writer")
    }

    /// Put a complete trip (record plus `points` track entries) in the source.
    pub async fn seed(&self, id: &TripIdentity, points: usize) {
        self.source
            .put_completion(id, completion_record(id.trip_id()))
            .await;
        self.source.put_track(id, track_entries(points)).await;
    }
}
