//! Pipeline orchestrator
//!
//! Drives one trip through the stores:
//!
//! 1. skip if the ledger already says `completed`
//! 2. claim (`processing`)
//! 3. fetch the completion record, then the track stream
//! 4. map both
//! 5. upsert the trip row, write the track artifact, archive it if configured
//! 6. mark `completed` with the artifact location
//!
//! Any error after the claim is recorded as `failed` and reported; it never
//! stops sibling trips. Each store call runs under the operation timeout and
//! transport failures are retried with linear backoff.

use futures::future::{self, Future};
use futures::stream::StreamExt;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use trip_common::{ProcessingStatus, TripIdentity};

use crate::config::PipelineSettings;
use crate::error::{PipelineError, PipelineResult};
use crate::ledger::ProcessingLedger;
use crate::mapper::{to_track_points, to_trip_completion};
use crate::source::{KeyRole, SourceStore};
use crate::sink::{ArtifactArchive, TrackSink, TripSink};

pub mod report;

pub use report::{BatchReport, PurgeOutcome, TripDetails, TripOutcome, TripReport};

#[derive(Clone)]
pub struct Pipeline {
    source: Arc<dyn SourceStore>,
    ledger: Arc<dyn ProcessingLedger>,
    trips: Arc<dyn TripSink>,
    tracks: Arc<dyn TrackSink>,
    archive: Option<Arc<dyn ArtifactArchive>>,
    settings: PipelineSettings,
}

impl Pipeline {
    pub fn new(
        source: Arc<dyn SourceStore>,
        ledger: Arc<dyn ProcessingLedger>,
        trips: Arc<dyn TripSink>,
        tracks: Arc<dyn TrackSink>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            source,
            ledger,
            trips,
            tracks,
            archive: None,
            settings,
        }
    }

    pub fn with_archive(mut self, archive: Arc<dyn ArtifactArchive>) -> Self {
        self.archive = Some(archive);
        self
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Run `op` under the operation timeout, retrying retryable failures.
    async fn attempt<T, F, Fut>(&self, step: &'static str, mut op: F) -> PipelineResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = PipelineResult<T>>,
    {
        let timeout = self.settings.operation_timeout();
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            let result = match tokio::time::timeout(timeout, op()).await {
                Ok(result) => result,
                Err(_) => Err(PipelineError::unavailable(
                    step,
                    format!("timed out after {:?}", timeout),
                )),
            };

            match result {
                Err(e) if e.is_retryable() && attempt <= self.settings.max_retries => {
                    let delay = self.settings.backoff_delay(attempt);
                    warn!(
                        step,
                        attempt,
                        max_retries = self.settings.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Retrying after transient failure"
                    );
                    tokio::time::sleep(delay).await;
                }
                other => return other,
            }
        }
    }

    /// Process one trip. Never returns an error: failures are part of the
    /// outcome.
    #[instrument(skip(self), fields(trip = %identity))]
    pub async fn process_trip(&self, identity: &TripIdentity) -> TripOutcome {
        match self
            .attempt("ledger", || self.ledger.latest_status(identity))
            .await
        {
            Ok(Some(entry)) if entry.status == ProcessingStatus::Completed => {
                debug!("Already completed, skipping");
                return TripOutcome::Skipped {
                    artifact: entry.artifact_path,
                };
            }
            Ok(_) => {}
            Err(e) => {
                error!(error = %e, "Cannot read ledger");
                return TripOutcome::failed(&e);
            }
        }

        if let Err(e) = self.attempt("ledger", || self.ledger.claim(identity)).await {
            error!(error = %e, "Cannot claim trip");
            return TripOutcome::failed(&e);
        }

        match self.migrate(identity).await {
            Ok((location, rows)) => {
                match self
                    .attempt("ledger", || self.ledger.complete(identity, &location))
                    .await
                {
                    Ok(()) => {
                        info!(artifact = %location, rows, "Trip migrated");
                        TripOutcome::Completed {
                            artifact: location,
                            rows,
                        }
                    }
                    Err(e) => {
                        error!(error = %e, "Sinks written but completion not recorded");
                        TripOutcome::failed(&e)
                    }
                }
            }
            Err(e) => {
                warn!(kind = e.kind(), error = %e, "Trip failed");
                let message = e.to_string();
                if let Err(ledger_err) = self
                    .attempt("ledger", || self.ledger.fail(identity, &message))
                    .await
                {
                    error!(error = %ledger_err, "Cannot record failure in ledger");
                }
                TripOutcome::failed(&e)
            }
        }
    }

    /// Fetch, map and write. Returns the artifact location and row count.
    async fn migrate(&self, identity: &TripIdentity) -> PipelineResult<(String, usize)> {
        let raw = self
            .attempt("redis", || self.source.fetch_completion(identity))
            .await?;
        let entries = self
            .attempt("redis", || self.source.fetch_track(identity))
            .await?;

        let completion = to_trip_completion(raw, identity)?;
        let points = to_track_points(entries);

        self.attempt("postgres", || self.trips.upsert(&completion))
            .await?;
        let artifact = self
            .attempt("parquet", || self.tracks.write_track(identity, &points))
            .await?;

        let location = match &self.archive {
            Some(archive) => {
                self.attempt("s3", || archive.archive(identity, &artifact))
                    .await?
            }
            None => artifact.path.display().to_string(),
        };

        Ok((location, artifact.rows))
    }

    async fn process_reported(&self, identity: TripIdentity) -> TripReport {
        let started = Instant::now();
        let outcome = self.process_trip(&identity).await;
        TripReport {
            identity,
            outcome,
            elapsed: started.elapsed(),
        }
    }

    fn default_pattern(&self) -> String {
        self.source.layout().completion_pattern()
    }

    /// Sort a discovered key into an identity, a skip, or a malformed key.
    fn classify(&self, raw: &str) -> Result<Option<TripIdentity>, PipelineError> {
        let key = self.source.layout().parse(raw)?;
        match key.role {
            KeyRole::Completion => Ok(Some(key.identity)),
            KeyRole::Track => {
                debug!(key = %raw, "Ignoring track key matched by pattern");
                Ok(None)
            }
        }
    }

    /// Discover and process every matching trip.
    ///
    /// Trips run through a pool of `settings.concurrency` workers. Once
    /// `cancel` fires no further trips are started; trips in flight finish.
    pub async fn process_all(&self, pattern: Option<&str>, cancel: &CancellationToken) -> BatchReport {
        let pattern = pattern
            .map(str::to_string)
            .unwrap_or_else(|| self.default_pattern());
        let concurrency = self.settings.concurrency.max(1);

        info!(pattern = %pattern, concurrency, "Starting batch");

        let mut seen = HashSet::new();
        let mut malformed_keys = Vec::new();
        let mut discovery_errors = Vec::new();

        let trips: Vec<TripReport> = self
            .source
            .discover_trips(&pattern)
            .filter_map(|item| {
                let identity = match item {
                    Ok(raw) => match self.classify(&raw) {
                        Ok(Some(id)) if seen.insert(id.clone()) => Some(id),
                        Ok(_) => None,
                        Err(e) => {
                            warn!(key = %raw, error = %e, "Skipping malformed key");
                            malformed_keys.push(raw);
                            None
                        }
                    },
                    Err(e) => {
                        error!(error = %e, "Key discovery failed");
                        discovery_errors.push(e.to_string());
                        None
                    }
                };
                future::ready(identity)
            })
            .take_until(cancel.cancelled())
            .map(|identity| self.process_reported(identity))
            .buffer_unordered(concurrency)
            .collect()
            .await;

        let report = BatchReport {
            trips,
            malformed_keys,
            discovery_errors,
            cancelled: cancel.is_cancelled(),
        };

        info!(
            total = report.total(),
            completed = report.completed(),
            skipped = report.skipped(),
            failed = report.failed(),
            malformed = report.malformed_keys.len(),
            cancelled = report.cancelled,
            "Batch finished"
        );

        report
    }

    /// Identities of all matching trips, sorted, without processing them.
    pub async fn list_trips(&self, pattern: Option<&str>) -> PipelineResult<Vec<TripIdentity>> {
        let pattern = pattern
            .map(str::to_string)
            .unwrap_or_else(|| self.default_pattern());

        let mut keys = self.source.discover_trips(&pattern);
        let mut identities = HashSet::new();

        while let Some(raw) = keys.next().await {
            let raw = raw?;
            match self.classify(&raw) {
                Ok(Some(id)) => {
                    identities.insert(id);
                }
                Ok(None) => {}
                Err(e) => warn!(key = %raw, error = %e, "Skipping malformed key"),
            }
        }

        let mut identities: Vec<_> = identities.into_iter().collect();
        identities.sort();
        Ok(identities)
    }

    /// Ledger history, relational row and local artifacts of one trip.
    pub async fn trip_details(&self, identity: &TripIdentity) -> PipelineResult<TripDetails> {
        let history = self
            .attempt("ledger", || self.ledger.history(identity))
            .await?;
        let stored = self
            .attempt("postgres", || self.trips.fetch(identity.trip_id()))
            .await?;
        let artifacts = self.tracks.list_artifacts(identity).await?;

        Ok(TripDetails {
            identity: identity.clone(),
            history,
            stored,
            artifacts,
        })
    }

    /// Delete a trip's source data once it is safely migrated.
    ///
    /// Refused unless the latest ledger entry is `completed`, or `force` is set.
    #[instrument(skip(self), fields(trip = %identity))]
    pub async fn purge_trip(&self, identity: &TripIdentity, force: bool) -> PipelineResult<PurgeOutcome> {
        let latest = self
            .attempt("ledger", || self.ledger.latest_status(identity))
            .await?
            .map(|e| e.status);

        if latest != Some(ProcessingStatus::Completed) && !force {
            warn!(status = ?latest, "Refusing to purge a trip that is not completed");
            return Ok(PurgeOutcome::Refused {
                status: latest.map(|s| s.to_string()),
            });
        }

        self.attempt("redis", || self.source.delete_trip(identity))
            .await?;
        info!(forced = force, "Trip purged from source");
        Ok(PurgeOutcome::Purged)
    }
}
