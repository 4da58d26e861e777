//! Configuration management
//!
//! Everything is read from the environment (after loading `.env`), falling back
//! to the `DEFAULT_*` constants below.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::db::DbConfig;

// ============================================================================
// Source Store Constants
// ============================================================================

pub const DEFAULT_REDIS_HOST: &str = "localhost";

pub const DEFAULT_REDIS_PORT: u16 = 6379;

pub const DEFAULT_REDIS_DB: i64 = 0;

/// Default prefix of every trip key.
pub const DEFAULT_KEY_PREFIX: &str = "trip";

/// Default `COUNT` hint passed to `SCAN`.
pub const DEFAULT_SCAN_COUNT: usize = 500;

/// Default number of stream entries fetched per `XRANGE` call.
pub const DEFAULT_STREAM_PAGE_SIZE: usize = 1000;

// ============================================================================
// Database Constants
// ============================================================================

pub const DEFAULT_POSTGRES_HOST: &str = "localhost";

pub const DEFAULT_POSTGRES_PORT: u16 = 5432;

pub const DEFAULT_POSTGRES_USER: &str = "postgres";

pub const DEFAULT_POSTGRES_DATABASE: &str = "trips";

pub const DEFAULT_DATABASE_MAX_CONNECTIONS: u32 = 10;

pub const DEFAULT_DATABASE_MIN_CONNECTIONS: u32 = 1;

pub const DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Default database idle timeout in seconds (10 minutes).
pub const DEFAULT_DATABASE_IDLE_TIMEOUT_SECS: u64 = 600;

// ============================================================================
// Output / Pipeline Constants
// ============================================================================

pub const DEFAULT_PARQUET_OUTPUT_DIR: &str = "./output/parquet";

pub const DEFAULT_S3_REGION: &str = "us-east-1";

pub const DEFAULT_CONCURRENCY: usize = 4;

pub const DEFAULT_MAX_RETRIES: u32 = 3;

pub const DEFAULT_RETRY_BACKOFF_MS: u64 = 500;

pub const DEFAULT_OPERATION_TIMEOUT_SECS: u64 = 30;

/// Pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub source: SourceConfig,
    pub database: DbConfig,
    pub output: OutputConfig,
    pub archive: Option<ArchiveConfig>,
    pub pipeline: PipelineSettings,
}

/// Redis connection and key layout
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    pub url: String,
    pub key_prefix: String,
    pub scan_count: usize,
    pub stream_page_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    pub parquet_dir: PathBuf,
}

/// S3-compatible object storage for artifacts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveConfig {
    pub endpoint: Option<String>,
    pub region: String,
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
    pub path_style: bool,
    /// Keep the local Parquet file after a successful upload
    pub keep_local: bool,
}

/// Orchestrator tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSettings {
    pub concurrency: usize,
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
    pub operation_timeout_secs: u64,
}

impl PipelineSettings {
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    /// Linear backoff before retry number `attempt`, saturating at
    /// `Duration::MAX`.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        self.retry_backoff()
            .checked_mul(attempt)
            .unwrap_or(Duration::MAX)
    }

    pub fn operation_timeout(&self) -> Duration {
        Duration::from_secs(self.operation_timeout_secs)
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_backoff_ms: DEFAULT_RETRY_BACKOFF_MS,
            operation_timeout_secs: DEFAULT_OPERATION_TIMEOUT_SECS,
        }
    }
}

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

fn env_nonempty(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.trim().is_empty())
}

impl SourceConfig {
    pub fn from_env() -> Self {
        let url = env_nonempty("REDIS_URL").unwrap_or_else(|| {
            let host = env_nonempty("REDIS_HOST").unwrap_or_else(|| DEFAULT_REDIS_HOST.to_string());
            let port: u16 = env_or("REDIS_PORT", DEFAULT_REDIS_PORT);
            let db: i64 = env_or("REDIS_DB", DEFAULT_REDIS_DB);
            match env_nonempty("REDIS_PASSWORD") {
                Some(password) => format!("redis://:{}@{}:{}/{}", password, host, port, db),
                None => format!("redis://{}:{}/{}", host, port, db),
            }
        });

        Self {
            url,
            key_prefix: env_nonempty("TRIP_KEY_PREFIX")
                .unwrap_or_else(|| DEFAULT_KEY_PREFIX.to_string()),
            scan_count: env_or("REDIS_SCAN_COUNT", DEFAULT_SCAN_COUNT),
            stream_page_size: env_or("REDIS_STREAM_PAGE_SIZE", DEFAULT_STREAM_PAGE_SIZE),
        }
    }
}

impl ArchiveConfig {
    /// `None` unless a bucket and both keys are configured.
    pub fn from_env() -> Option<Self> {
        let bucket = env_nonempty("S3_BUCKET")?;
        let access_key = env_nonempty("S3_ACCESS_KEY")?;
        let secret_key = env_nonempty("S3_SECRET_KEY")?;

        Some(Self {
            endpoint: env_nonempty("S3_ENDPOINT"),
            region: env_nonempty("S3_REGION").unwrap_or_else(|| DEFAULT_S3_REGION.to_string()),
            bucket,
            access_key,
            secret_key,
            path_style: env_or("S3_PATH_STYLE", false),
            keep_local: env_or("S3_KEEP_LOCAL", false),
        })
    }
}

impl Config {
    /// Load configuration from environment and defaults
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let database_url = env_nonempty("DATABASE_URL").unwrap_or_else(|| {
            let host =
                env_nonempty("POSTGRES_HOST").unwrap_or_else(|| DEFAULT_POSTGRES_HOST.to_string());
            let port: u16 = env_or("POSTGRES_PORT", DEFAULT_POSTGRES_PORT);
            let user =
                env_nonempty("POSTGRES_USER").unwrap_or_else(|| DEFAULT_POSTGRES_USER.to_string());
            let database = env_nonempty("POSTGRES_DATABASE")
                .unwrap_or_else(|| DEFAULT_POSTGRES_DATABASE.to_string());
            match env_nonempty("POSTGRES_PASSWORD") {
                Some(password) => {
                    format!("postgresql://{}:{}@{}:{}/{}", user, password, host, port, database)
                }
                None => format!("postgresql://{}@{}:{}/{}", user, host, port, database),
            }
        });

        let config = Config {
            source: SourceConfig::from_env(),
            database: DbConfig {
                url: database_url,
                max_connections: env_or("DATABASE_MAX_CONNECTIONS", DEFAULT_DATABASE_MAX_CONNECTIONS),
                min_connections: env_or("DATABASE_MIN_CONNECTIONS", DEFAULT_DATABASE_MIN_CONNECTIONS),
                connect_timeout_secs: env_or(
                    "DATABASE_CONNECT_TIMEOUT",
                    DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS,
                ),
                idle_timeout_secs: env_or("DATABASE_IDLE_TIMEOUT", DEFAULT_DATABASE_IDLE_TIMEOUT_SECS),
            },
            output: OutputConfig {
                parquet_dir: PathBuf::from(
                    env_nonempty("PARQUET_OUTPUT_DIR")
                        .unwrap_or_else(|| DEFAULT_PARQUET_OUTPUT_DIR.to_string()),
                ),
            },
            archive: ArchiveConfig::from_env(),
            pipeline: PipelineSettings {
                concurrency: env_or("PIPELINE_CONCURRENCY", DEFAULT_CONCURRENCY),
                max_retries: env_or("PIPELINE_MAX_RETRIES", DEFAULT_MAX_RETRIES),
                retry_backoff_ms: env_or("PIPELINE_RETRY_BACKOFF_MS", DEFAULT_RETRY_BACKOFF_MS),
                operation_timeout_secs: env_or(
                    "PIPELINE_OPERATION_TIMEOUT_SECS",
                    DEFAULT_OPERATION_TIMEOUT_SECS,
                ),
            },
        };

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.source.url.is_empty() {
            anyhow::bail!("Redis URL cannot be empty");
        }

        if self.source.key_prefix.is_empty() || self.source.key_prefix.contains(':') {
            anyhow::bail!(
                "Key prefix '{}' must be non-empty and must not contain ':'",
                self.source.key_prefix
            );
        }

        if self.source.scan_count == 0 || self.source.stream_page_size == 0 {
            anyhow::bail!("REDIS_SCAN_COUNT and REDIS_STREAM_PAGE_SIZE must be greater than 0");
        }

        if self.database.url.is_empty() {
            anyhow::bail!("Database URL cannot be empty");
        }

        if self.database.max_connections == 0 {
            anyhow::bail!("Database max_connections must be greater than 0");
        }

        if self.database.min_connections > self.database.max_connections {
            anyhow::bail!(
                "Database min_connections ({}) cannot be greater than max_connections ({})",
                self.database.min_connections,
                self.database.max_connections
            );
        }

        if self.pipeline.concurrency == 0 {
            anyhow::bail!("Pipeline concurrency must be greater than 0");
        }

        if self.pipeline.operation_timeout_secs == 0 {
            anyhow::bail!("Pipeline operation timeout must be greater than 0");
        }

        if self.archive.is_none() {
            tracing::debug!("S3 archive not configured - artifacts stay on local disk");
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            source: SourceConfig {
                url: format!(
                    "redis://{}:{}/{}",
                    DEFAULT_REDIS_HOST, DEFAULT_REDIS_PORT, DEFAULT_REDIS_DB
                ),
                key_prefix: DEFAULT_KEY_PREFIX.to_string(),
                scan_count: DEFAULT_SCAN_COUNT,
                stream_page_size: DEFAULT_STREAM_PAGE_SIZE,
            },
            database: DbConfig::default(),
            output: OutputConfig {
                parquet_dir: PathBuf::from(DEFAULT_PARQUET_OUTPUT_DIR),
            },
            archive: None,
            pipeline: PipelineSettings::default(),
        }
    }
}
