//! `trip-migrate purge` command implementation

use colored::Colorize;

use trip_common::TripIdentity;
use trip_pipeline::pipeline::PurgeOutcome;
use trip_pipeline::Pipeline;

use crate::error::Result;
use crate::{EXIT_FAILURE, EXIT_OK};

/// Delete a trip's completion, track and status keys from Redis.
///
/// Refused unless the trip's latest ledger entry is `completed`, or `force`.
pub async fn run(pipeline: &Pipeline, trip_id: &str, start_date: &str, force: bool) -> Result<i32> {
    let identity = TripIdentity::new(trip_id, start_date)?;

    match pipeline.purge_trip(&identity, force).await? {
        PurgeOutcome::Purged => {
            println!("{} Purged {} from Redis", "✓".green(), identity);
            Ok(EXIT_OK)
        }
        PurgeOutcome::Refused { status } => {
            let status = status.unwrap_or_else(|| "never processed".to_string());
            println!(
                "{} Refusing to purge {}: latest status is {}. Use --force to purge anyway.",
                "✗".red(),
                identity,
                status.yellow()
            );
            Ok(EXIT_FAILURE)
        }
    }
}
