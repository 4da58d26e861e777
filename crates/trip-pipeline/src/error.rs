//! Pipeline error taxonomy
//!
//! Every per-trip failure is one of these variants. The orchestrator decides
//! what to do with it: malformed keys are skipped, [`PipelineError::is_retryable`]
//! errors are retried with backoff, everything else is recorded as `failed` in
//! the ledger and the batch moves on.

use thiserror::Error;
use trip_common::CommonError;

pub type PipelineResult<T> = Result<T, PipelineError>;

#[derive(Error, Debug)]
pub enum PipelineError {
    /// A source key that does not follow `<prefix>:<trip>:<YYYYMMDD>:<role>`
    #[error("Malformed key '{key}': {reason}")]
    MalformedKey { key: String, reason: String },

    /// The completion record or track stream does not exist
    #[error("{0}")]
    NotFound(String),

    /// A record was fetched but cannot be mapped onto the domain types
    #[error("Schema violation: {0}")]
    SchemaViolation(String),

    /// A store could not be reached or timed out. Retryable.
    #[error("{store} unavailable: {message}")]
    SinkUnavailable { store: &'static str, message: String },

    /// A store rejected the data itself. Not retryable.
    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    pub fn malformed_key(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedKey {
            key: key.into(),
            reason: reason.into(),
        }
    }

    pub fn not_found(resource: &str, identifier: impl std::fmt::Display) -> Self {
        Self::NotFound(format!("{} '{}' not found", resource, identifier))
    }

    pub fn schema(msg: impl Into<String>) -> Self {
        Self::SchemaViolation(msg.into())
    }

    pub fn unavailable(store: &'static str, message: impl std::fmt::Display) -> Self {
        Self::SinkUnavailable {
            store,
            message: message.to_string(),
        }
    }

    pub fn constraint(msg: impl Into<String>) -> Self {
        Self::ConstraintViolation(msg.into())
    }

    /// Only transport-level failures are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::SinkUnavailable { .. })
    }

    /// Short machine-friendly name, used in logs and reports.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MalformedKey { .. } => "malformed_key",
            Self::NotFound(_) => "not_found",
            Self::SchemaViolation(_) => "schema_violation",
            Self::SinkUnavailable { .. } => "sink_unavailable",
            Self::ConstraintViolation(_) => "constraint_violation",
            Self::Config(_) => "config",
            Self::Io(_) => "io",
        }
    }

    /// Classify a PostgreSQL error by SQLSTATE class.
    ///
    /// Class 22 (data exception) and 23 (integrity constraint) are data-level
    /// rejections. Connection, resource, operator-intervention and
    /// serialization classes, and any non-database error, are transport-level.
    pub fn from_sqlx(store: &'static str, err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db) => {
                let code = db.code().map(|c| c.into_owned()).unwrap_or_default();
                match code.get(..2) {
                    Some("22") | Some("23") => Self::constraint(db.message().to_string()),
                    Some("08") | Some("40") | Some("53") | Some("57") => {
                        Self::unavailable(store, err)
                    }
                    _ => Self::constraint(format!("{} (sqlstate {})", db.message(), code)),
                }
            }
            sqlx::Error::RowNotFound => Self::NotFound(err.to_string()),
            sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
                Self::schema(err.to_string())
            }
            _ => Self::unavailable(store, err),
        }
    }

    /// Redis I/O, timeouts and dropped connections are transport-level; reply
    /// type mismatches mean the stored data has an unexpected shape.
    pub fn from_redis(err: redis::RedisError) -> Self {
        if err.is_io_error()
            || err.is_timeout()
            || err.is_connection_dropped()
            || err.is_connection_refusal()
            || err.is_cluster_error()
        {
            Self::unavailable("redis", err)
        } else if err.kind() == redis::ErrorKind::TypeError {
            Self::schema(err.to_string())
        } else {
            Self::unavailable("redis", err)
        }
    }
}

impl From<CommonError> for PipelineError {
    fn from(err: CommonError) -> Self {
        match err {
            CommonError::InvalidIdentity(msg) => Self::SchemaViolation(msg),
            CommonError::InvalidStatus(msg) => Self::SchemaViolation(msg),
            CommonError::Io(e) => Self::Io(e),
            other => Self::Config(other.to_string()),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_only_unavailable_is_retryable() {
        assert!(PipelineError::unavailable("postgres", "connection reset").is_retryable());
        assert!(!PipelineError::constraint("distance_km < 0").is_retryable());
        assert!(!PipelineError::not_found("completion record", "trip:1:20250901:completion")
            .is_retryable());
        assert!(!PipelineError::schema("missing trip_id").is_retryable());
    }

    #[test]
    fn test_display_includes_context() {
        let err = PipelineError::malformed_key("trip:1:completion", "expected 4 segments, got 3");
        assert_eq!(
            err.to_string(),
            "Malformed key 'trip:1:completion': expected 4 segments, got 3"
        );

        let err = PipelineError::unavailable("redis", "timed out after 30s");
        assert_eq!(err.to_string(), "redis unavailable: timed out after 30s");
        assert_eq!(err.kind(), "sink_unavailable");
    }

    #[test]
    fn test_sqlx_transport_errors_are_unavailable() {
        let err = PipelineError::from_sqlx("postgres", sqlx::Error::PoolTimedOut);
        assert!(err.is_retryable());

        let err = PipelineError::from_sqlx("postgres", sqlx::Error::RowNotFound);
        assert_eq!(err.kind(), "not_found");
    }
}
