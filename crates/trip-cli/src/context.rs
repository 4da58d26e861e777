//! Store wiring
//!
//! Connects every store named in the configuration and assembles a
//! [`Pipeline`]. Any store that cannot be reached here is fatal.

use std::sync::Arc;
use tracing::info;

use trip_pipeline::config::Config;
use trip_pipeline::db::{create_pool, health_check};
use trip_pipeline::ledger::PgLedger;
use trip_pipeline::sink::{ParquetTrackWriter, PgTripSink, S3Archive};
use trip_pipeline::source::RedisSourceStore;
use trip_pipeline::Pipeline;

use crate::error::{CliError, Result};

/// Load configuration from the environment and `.env`.
pub fn load_config() -> Result<Config> {
    Config::load().map_err(CliError::from_config)
}

/// Connect Redis, PostgreSQL, the Parquet output directory and, when
/// configured, the S3 bucket.
pub async fn connect(config: &Config) -> Result<Pipeline> {
    let source = RedisSourceStore::connect(&config.source)
        .await
        .map_err(|e| CliError::unreachable("Redis", e))?;
    source
        .ping()
        .await
        .map_err(|e| CliError::unreachable("Redis", e))?;

    info!(url = %config.database.redacted_url(), "Connecting to PostgreSQL");
    let pool = create_pool(&config.database)
        .await
        .map_err(|e| CliError::unreachable("PostgreSQL", e))?;
    health_check(&pool)
        .await
        .map_err(|e| CliError::unreachable("PostgreSQL", e))?;

    sqlx::migrate!("../../migrations").run(&pool).await?;

    let writer = ParquetTrackWriter::new(&config.output.parquet_dir)?;

    let mut pipeline = Pipeline::new(
        Arc::new(source),
        Arc::new(PgLedger::new(pool.clone())),
        Arc::new(PgTripSink::new(pool)),
        Arc::new(writer),
        config.pipeline.clone(),
    );

    if let Some(archive_config) = &config.archive {
        let archive = S3Archive::new(archive_config);
        archive
            .check_bucket()
            .await
            .map_err(|e| CliError::unreachable("S3", e))?;
        info!(bucket = %archive.bucket(), "Artifacts will be archived to S3");
        pipeline = pipeline.with_archive(Arc::new(archive));
    }

    Ok(pipeline)
}
