//! CLI command implementations
//!
//! Each subcommand has its own module. Commands return the process exit
//! status on success; errors are turned into exit status 1 by `main`.

pub mod list;
pub mod process;
pub mod purge;
pub mod show;

use colored::{ColoredString, Colorize};
use trip_pipeline::TripOutcome;

/// Colored outcome label for tables and summaries.
pub(crate) fn outcome_label(outcome: &TripOutcome) -> ColoredString {
    match outcome {
        TripOutcome::Completed { .. } => "completed".green(),
        TripOutcome::Skipped { .. } => "skipped".yellow(),
        TripOutcome::Failed { .. } => "failed".red().bold(),
    }
}

/// One-line detail for an outcome: artifact location or error.
pub(crate) fn outcome_detail(outcome: &TripOutcome) -> String {
    match outcome {
        TripOutcome::Completed { artifact, rows } => format!("{} rows -> {}", rows, artifact),
        TripOutcome::Skipped { artifact: Some(artifact) } => format!("already at {}", artifact),
        TripOutcome::Skipped { artifact: None } => "already completed".to_string(),
        TripOutcome::Failed { kind, error } => format!("[{}] {}", kind, error),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_detail() {
        let done = TripOutcome::Completed {
            artifact: "out/trip_1.parquet".to_string(),
            rows: 3,
        };
        assert_eq!(outcome_detail(&done), "3 rows -> out/trip_1.parquet");

        let failed = TripOutcome::Failed {
            kind: "not_found",
            error: "Not found: track stream trip:1:20250901:track".to_string(),
        };
        assert!(outcome_detail(&failed).starts_with("[not_found]"));
    }
}
