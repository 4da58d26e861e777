//! Parquet track writer
//!
//! One file per trip per run, named
//! `trip_<trip_id>_<start_date>_<write timestamp>.parquet`. Files are written
//! under a hidden temporary name and renamed into place once closed, so a
//! reader never sees a half-written artifact.

use arrow::array::{ArrayRef, Float64Array, StringArray, TimestampMillisecondArray};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef, TimeUnit};
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use chrono::Utc;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::{EnabledStatistics, WriterProperties};
use parquet::file::reader::{FileReader, SerializedFileReader};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument};

use trip_common::TripIdentity;

use super::{Artifact, ArtifactInfo, TrackSink};
use crate::error::{PipelineError, PipelineResult};
use crate::mapper::TrackPoint;

const STORE: &str = "parquet";
const EXTENSION: &str = "parquet";
const MAX_NAME_ATTEMPTS: u32 = 5;
/// Write timestamp in artifact names: `YYYYMMDDTHHMMSS` plus microseconds.
const STAMP_FORMAT: &str = "%Y%m%dT%H%M%S%6f";
const STAMP_LEN: usize = 21;

pub struct ParquetTrackWriter {
    output_dir: PathBuf,
    props: WriterProperties,
    schema: SchemaRef,
}

impl ParquetTrackWriter {
    /// Create the output directory if needed and check it is writable.
    pub fn new(output_dir: impl Into<PathBuf>) -> PipelineResult<Self> {
        let output_dir = output_dir.into();
        std::fs::create_dir_all(&output_dir)?;

        let marker = output_dir.join(".write-check");
        std::fs::write(&marker, b"")?;
        std::fs::remove_file(&marker)?;

        info!(dir = %output_dir.display(), "Parquet output directory ready");

        Ok(Self {
            output_dir,
            props: WriterProperties::builder()
                .set_compression(Compression::SNAPPY)
                .set_statistics_enabled(EnabledStatistics::Chunk)
                .set_created_by("trip-migrate".to_string())
                .build(),
            schema: track_schema(),
        })
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    fn file_prefix(identity: &TripIdentity) -> String {
        format!("trip_{}_{}_", identity.trip_id(), identity.start_date())
    }

    fn to_batch(&self, identity: &TripIdentity, points: &[TrackPoint]) -> PipelineResult<RecordBatch> {
        let columns: Vec<ArrayRef> = vec![
            Arc::new(StringArray::from(vec![identity.trip_id(); points.len()])),
            Arc::new(StringArray::from_iter_values(
                points.iter().map(|p| p.message_id.as_str()),
            )),
            Arc::new(
                TimestampMillisecondArray::from_iter_values(
                    points.iter().map(|p| p.received_at.timestamp_millis()),
                )
                .with_timezone("UTC"),
            ),
            Arc::new(Float64Array::from_iter_values(points.iter().map(|p| p.latitude))),
            Arc::new(Float64Array::from_iter_values(points.iter().map(|p| p.longitude))),
            Arc::new(Float64Array::from_iter(points.iter().map(|p| p.speed))),
            Arc::new(Float64Array::from_iter(points.iter().map(|p| p.heading))),
            Arc::new(
                TimestampMillisecondArray::from_iter(
                    points.iter().map(|p| p.device_time.map(|t| t.timestamp_millis())),
                )
                .with_timezone("UTC"),
            ),
            Arc::new(StringArray::from_iter_values(
                points.iter().map(|p| p.extra.to_string()),
            )),
        ];

        RecordBatch::try_new(Arc::clone(&self.schema), columns)
            .map_err(|e| PipelineError::schema(format!("track batch for {}: {}", identity, e)))
    }
}

fn track_schema() -> SchemaRef {
    let utc_millis = DataType::Timestamp(TimeUnit::Millisecond, Some("UTC".into()));
    Arc::new(Schema::new(vec![
        Field::new("trip_id", DataType::Utf8, false),
        Field::new("message_id", DataType::Utf8, false),
        Field::new("received_at", utc_millis.clone(), false),
        Field::new("latitude", DataType::Float64, false),
        Field::new("longitude", DataType::Float64, false),
        Field::new("speed", DataType::Float64, true),
        Field::new("heading", DataType::Float64, true),
        Field::new("device_time", utc_millis, true),
        Field::new("extra", DataType::Utf8, false),
    ]))
}

fn parquet_err(e: parquet::errors::ParquetError) -> PipelineError {
    PipelineError::unavailable(STORE, e)
}

/// Pick a file name no earlier run has used.
fn unique_path(dir: &Path, prefix: &str) -> PipelineResult<PathBuf> {
    for _ in 0..MAX_NAME_ATTEMPTS {
        let stamp = Utc::now().format(STAMP_FORMAT);
        let path = dir.join(format!("{}{}.{}", prefix, stamp, EXTENSION));
        if !path.exists() {
            return Ok(path);
        }
        std::thread::sleep(Duration::from_millis(1));
    }
    Err(PipelineError::unavailable(
        STORE,
        format!("no free artifact name for {} in {}", prefix, dir.display()),
    ))
}

/// Whether `name` is `<prefix><write timestamp>.parquet` exactly.
fn is_artifact_name(name: &str, prefix: &str) -> bool {
    let Some(stamp) = name
        .strip_prefix(prefix)
        .and_then(|rest| rest.strip_suffix(&format!(".{}", EXTENSION)))
    else {
        return false;
    };
    stamp.len() == STAMP_LEN
        && stamp.bytes().enumerate().all(|(i, b)| {
            if i == 8 {
                b == b'T'
            } else {
                b.is_ascii_digit()
            }
        })
}

fn find_artifacts(dir: &Path, prefix: &str) -> PipelineResult<Vec<ArtifactInfo>> {
    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| is_artifact_name(n, prefix))
        })
        .collect();
    // The timestamp suffix sorts chronologically.
    paths.sort();

    paths.iter().map(|p| inspect(p)).collect()
}

fn write_file(
    dir: &Path,
    prefix: &str,
    schema: SchemaRef,
    batch: RecordBatch,
    props: WriterProperties,
) -> PipelineResult<Artifact> {
    let path = unique_path(dir, prefix)?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp_path = dir.join(format!(".{}.tmp", file_name));

    let result = (|| {
        let file = File::create(&tmp_path)?;
        let mut writer = ArrowWriter::try_new(file, schema, Some(props)).map_err(parquet_err)?;
        if batch.num_rows() > 0 {
            writer.write(&batch).map_err(parquet_err)?;
        }
        writer.close().map_err(parquet_err)?;
        std::fs::rename(&tmp_path, &path)?;
        Ok::<_, PipelineError>(())
    })();

    if let Err(e) = result {
        let _ = std::fs::remove_file(&tmp_path);
        return Err(e);
    }

    let size_bytes = std::fs::metadata(&path)?.len();
    Ok(Artifact {
        path,
        rows: batch.num_rows(),
        size_bytes,
    })
}

/// Row count, size and column names of an artifact.
pub fn inspect(path: &Path) -> PipelineResult<ArtifactInfo> {
    let file = File::open(path)?;
    let size_bytes = file.metadata()?.len();
    let reader = SerializedFileReader::new(file).map_err(|e| {
        PipelineError::schema(format!("{} is not a Parquet file: {}", path.display(), e))
    })?;

    let metadata = reader.metadata().file_metadata();
    Ok(ArtifactInfo {
        path: path.to_path_buf(),
        rows: metadata.num_rows(),
        size_bytes,
        columns: metadata
            .schema_descr()
            .columns()
            .iter()
            .map(|c| c.name().to_string())
            .collect(),
    })
}

#[async_trait]
impl TrackSink for ParquetTrackWriter {
    #[instrument(skip(self, points), fields(trip = %identity, points = points.len()))]
    async fn write_track(
        &self,
        identity: &TripIdentity,
        points: &[TrackPoint],
    ) -> PipelineResult<Artifact> {
        let batch = self.to_batch(identity, points)?;
        let dir = self.output_dir.clone();
        let prefix = Self::file_prefix(identity);
        let schema = Arc::clone(&self.schema);
        let props = self.props.clone();

        let artifact =
            tokio::task::spawn_blocking(move || write_file(&dir, &prefix, schema, batch, props))
                .await
                .map_err(|e| PipelineError::unavailable(STORE, e))??;

        info!(
            path = %artifact.path.display(),
            rows = artifact.rows,
            bytes = artifact.size_bytes,
            "Track artifact written"
        );
        Ok(artifact)
    }

    async fn list_artifacts(&self, identity: &TripIdentity) -> PipelineResult<Vec<ArtifactInfo>> {
        let dir = self.output_dir.clone();
        let prefix = Self::file_prefix(identity);

        let artifacts = tokio::task::spawn_blocking(move || find_artifacts(&dir, &prefix))
            .await
            .map_err(|e| PipelineError::unavailable(STORE, e))??;

        debug!(trip = %identity, found = artifacts.len(), "Listed artifacts");
        Ok(artifacts)
    }
}
