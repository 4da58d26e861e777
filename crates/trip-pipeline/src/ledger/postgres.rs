//! PostgreSQL ledger over `trip_processing_log`

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use tracing::debug;

use trip_common::{ProcessingStatus, TripIdentity};

use super::{LedgerEntry, ProcessingLedger};
use crate::error::{PipelineError, PipelineResult};

const STORE: &str = "postgres";

#[derive(Debug, FromRow)]
struct LedgerRow {
    trip_id: String,
    start_date: String,
    processing_status: String,
    parquet_file_path: Option<String>,
    error_message: Option<String>,
    processed_at: DateTime<Utc>,
}

impl TryFrom<LedgerRow> for LedgerEntry {
    type Error = PipelineError;

    fn try_from(row: LedgerRow) -> Result<Self, Self::Error> {
        Ok(Self {
            status: row.processing_status.parse()?,
            trip_id: row.trip_id,
            start_date: row.start_date,
            artifact_path: row.parquet_file_path,
            error_message: row.error_message,
            processed_at: row.processed_at,
        })
    }
}

#[derive(Clone)]
pub struct PgLedger {
    pool: PgPool,
}

impl PgLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProcessingLedger for PgLedger {
    async fn record(
        &self,
        identity: &TripIdentity,
        status: ProcessingStatus,
        artifact_path: Option<&str>,
        error_message: Option<&str>,
    ) -> PipelineResult<()> {
        sqlx::query(
            r#"
            INSERT INTO trip_processing_log (
                trip_id, start_date, processing_status, parquet_file_path, error_message
            ) VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(identity.trip_id())
        .bind(identity.start_date())
        .bind(status.as_str())
        .bind(artifact_path)
        .bind(error_message)
        .execute(&self.pool)
        .await
        .map_err(|e| PipelineError::from_sqlx(STORE, e))?;

        debug!(trip = %identity, status = %status, "Ledger entry appended");
        Ok(())
    }

    async fn latest_status(&self, identity: &TripIdentity) -> PipelineResult<Option<LedgerEntry>> {
        let row = sqlx::query_as::<_, LedgerRow>(
            r#"
            SELECT trip_id, start_date, processing_status, parquet_file_path,
                   error_message, processed_at
            FROM trip_processing_log
            WHERE trip_id = $1 AND start_date = $2
            ORDER BY processed_at DESC, id DESC
            LIMIT 1
            "#,
        )
        .bind(identity.trip_id())
        .bind(identity.start_date())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| PipelineError::from_sqlx(STORE, e))?;

        row.map(LedgerEntry::try_from).transpose()
    }

    async fn history(&self, identity: &TripIdentity) -> PipelineResult<Vec<LedgerEntry>> {
        let rows = sqlx::query_as::<_, LedgerRow>(
            r#"
            SELECT trip_id, start_date, processing_status, parquet_file_path,
                   error_message, processed_at
            FROM trip_processing_log
            WHERE trip_id = $1 AND start_date = $2
            ORDER BY processed_at ASC, id ASC
            "#,
        )
        .bind(identity.trip_id())
        .bind(identity.start_date())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| PipelineError::from_sqlx(STORE, e))?;

        rows.into_iter().map(LedgerEntry::try_from).collect()
    }
}
