//! `trip-migrate process` and `trip-migrate process-all`

use colored::Colorize;
use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, Table};
use tokio_util::sync::CancellationToken;

use trip_common::TripIdentity;
use trip_pipeline::{BatchReport, Pipeline};

use super::{outcome_detail, outcome_label};
use crate::error::Result;
use crate::progress::{create_spinner, format_elapsed};
use crate::{EXIT_CANCELLED, EXIT_FAILURE, EXIT_OK};

/// Migrate a single trip.
pub async fn run(pipeline: &Pipeline, trip_id: &str, start_date: &str) -> Result<i32> {
    let identity = TripIdentity::new(trip_id, start_date)?;

    let spinner = create_spinner(&format!("Migrating trip {}", identity));
    let outcome = pipeline.process_trip(&identity).await;
    spinner.finish_and_clear();

    println!(
        "{} {}: {}",
        identity.to_string().bold(),
        outcome_label(&outcome),
        outcome_detail(&outcome)
    );

    Ok(if outcome.is_failure() {
        EXIT_FAILURE
    } else {
        EXIT_OK
    })
}

/// Discover and migrate every trip matching `pattern`.
pub async fn run_all(
    pipeline: &Pipeline,
    pattern: Option<&str>,
    cancel: &CancellationToken,
) -> Result<i32> {
    let spinner = create_spinner(&format!(
        "Migrating trips ({} at a time)",
        pipeline.settings().concurrency
    ));
    let report = pipeline.process_all(pattern, cancel).await;
    spinner.finish_and_clear();

    print_report(&report);

    Ok(exit_status(&report))
}

/// Exit status for a finished batch.
pub fn exit_status(report: &BatchReport) -> i32 {
    if report.cancelled {
        EXIT_CANCELLED
    } else if report.has_failures() {
        EXIT_FAILURE
    } else {
        EXIT_OK
    }
}

fn print_report(report: &BatchReport) {
    if report.trips.is_empty() {
        println!("No trips found.");
    } else {
        let mut trips: Vec<_> = report.trips.iter().collect();
        trips.sort_by(|a, b| a.identity.cmp(&b.identity));

        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .apply_modifier(UTF8_ROUND_CORNERS)
            .set_header(vec!["Trip", "Start date", "Outcome", "Time", "Detail"]);

        for trip in trips {
            table.add_row(vec![
                trip.identity.trip_id().to_string(),
                trip.identity.start_date().to_string(),
                outcome_label(&trip.outcome).to_string(),
                format_elapsed(trip.elapsed),
                outcome_detail(&trip.outcome),
            ]);
        }

        println!("{}", table);
    }

    for key in &report.malformed_keys {
        println!("{} {}", "Skipped malformed key:".yellow(), key);
    }
    for error in &report.discovery_errors {
        println!("{} {}", "Discovery error:".red(), error);
    }

    println!();
    println!("{}", "Summary:".cyan().bold());
    println!("  Total:     {}", report.total());
    println!("  Completed: {}", report.completed().to_string().green());
    println!("  Skipped:   {}", report.skipped());
    println!("  Failed:    {}", report.failed().to_string().red());

    if report.cancelled {
        println!();
        println!(
            "{}",
            "Interrupted: remaining trips were not started. Re-run to continue.".yellow()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use trip_pipeline::pipeline::TripReport;
    use trip_pipeline::TripOutcome;

    #[allow(clippy::unwrap_used, clippy::expect_used)]
    fn report(outcome: TripOutcome) -> BatchReport {
        BatchReport {
            trips: vec![TripReport {
                identity: TripIdentity::new("1", "20250901").unwrap(),
                outcome,
                elapsed: Duration::from_millis(5),
            }],
            ..Default::default()
        }
    }

    #[test]
    fn test_exit_status() {
        let ok = report(TripOutcome::Skipped { artifact: None });
        assert_eq!(exit_status(&ok), EXIT_OK);

        let failed = report(TripOutcome::Failed {
            kind: "not_found",
            error: "missing".to_string(),
        });
        assert_eq!(exit_status(&failed), EXIT_FAILURE);

        let cancelled = BatchReport {
            cancelled: true,
            ..failed
        };
        assert_eq!(exit_status(&cancelled), EXIT_CANCELLED);
    }

    #[test]
    fn test_discovery_error_fails_batch() {
        let report = BatchReport {
            discovery_errors: vec!["SCAN failed".to_string()],
            ..Default::default()
        };
        assert_eq!(exit_status(&report), EXIT_FAILURE);
    }
}
