//! Error types for the trip CLI
//!
//! Messages are user-facing: they say what went wrong and where to look.

use thiserror::Error;

use trip_common::CommonError;
use trip_pipeline::PipelineError;

/// Result type alias for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;

#[derive(Error, Debug)]
pub enum CliError {
    /// Configuration is missing or invalid
    #[error("Configuration error: {0}. Check your environment variables or .env file.")]
    Config(String),

    /// A store could not be reached at startup
    #[error("Cannot reach {store}: {source}. Check that it is running and the connection settings are correct.")]
    Unreachable {
        store: &'static str,
        #[source]
        source: PipelineError,
    },

    /// Trip id or start date given on the command line is invalid
    #[error("{0}. Trip ids must be non-empty without ':', '/' or '\\', and start dates use YYYYMMDD.")]
    InvalidTrip(#[from] CommonError),

    /// Schema migrations could not be applied
    #[error("Database migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

impl CliError {
    /// Configuration error carrying the full context chain of `err`.
    pub fn from_config(err: anyhow::Error) -> Self {
        Self::Config(format!("{:#}", err))
    }

    pub fn unreachable(store: &'static str, source: PipelineError) -> Self {
        Self::Unreachable { store, source }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_trip_message_has_hint() {
        let err = CliError::from(CommonError::invalid_identity("start date '2025-09-01'"));
        let msg = err.to_string();
        assert!(msg.contains("2025-09-01"));
        assert!(msg.contains("YYYYMMDD"));
    }

    #[test]
    fn test_config_error_keeps_context_chain() {
        let err = anyhow::anyhow!("PIPELINE_CONCURRENCY must be greater than 0")
            .context("invalid pipeline settings");
        let err = CliError::from_config(err);

        assert!(matches!(err, CliError::Config(_)));
        let msg = err.to_string();
        assert!(msg.contains("invalid pipeline settings: PIPELINE_CONCURRENCY"), "{msg}");
        assert!(msg.ends_with("Check your environment variables or .env file."));
    }

    #[test]
    fn test_unreachable_names_store() {
        let err = CliError::unreachable(
            "Redis",
            PipelineError::unavailable("redis", "connection refused"),
        );
        assert!(err.to_string().starts_with("Cannot reach Redis"));
    }
}
