//! `trip-migrate show` command implementation
//!
//! Prints what each store knows about one trip: the processing ledger, the
//! relational row and the Parquet artifacts on disk.

use colored::Colorize;
use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, Table};

use trip_common::TripIdentity;
use trip_pipeline::pipeline::TripDetails;
use trip_pipeline::sink::StoredTrip;
use trip_pipeline::Pipeline;

use crate::error::Result;
use crate::progress::format_bytes;
use crate::EXIT_OK;

pub async fn run(pipeline: &Pipeline, trip_id: &str, start_date: &str) -> Result<i32> {
    let identity = TripIdentity::new(trip_id, start_date)?;
    let details = pipeline.trip_details(&identity).await?;

    print_details(&details);

    Ok(EXIT_OK)
}

fn new_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS);
    table
}

fn print_details(details: &TripDetails) {
    println!("{}", format!("Trip {}", details.identity).cyan().bold());
    println!();

    println!("{}", "Processing history:".bold());
    if details.history.is_empty() {
        println!("  never processed");
    } else {
        let mut table = new_table();
        table.set_header(vec!["Processed at", "Status", "Artifact", "Error"]);
        for entry in &details.history {
            table.add_row(vec![
                entry.processed_at.format("%Y-%m-%d %H:%M:%S%.3f UTC").to_string(),
                entry.status.to_string(),
                entry.artifact_path.clone().unwrap_or_default(),
                entry.error_message.clone().unwrap_or_default(),
            ]);
        }
        println!("{}", table);
    }
    println!();

    println!("{}", "Stored trip:".bold());
    match &details.stored {
        Some(stored) => println!("{}", stored_table(stored)),
        None => println!("  not in database"),
    }
    println!();

    println!("{}", "Artifacts:".bold());
    if details.artifacts.is_empty() {
        println!("  none on local disk");
    } else {
        let mut table = new_table();
        table.set_header(vec!["Path", "Rows", "Size"]);
        for artifact in &details.artifacts {
            table.add_row(vec![
                artifact.path.display().to_string(),
                artifact.rows.to_string(),
                format_bytes(artifact.size_bytes),
            ]);
        }
        println!("{}", table);
    }
}

fn opt<T: ToString>(value: &Option<T>) -> String {
    value.as_ref().map(ToString::to_string).unwrap_or_default()
}

fn stored_table(stored: &StoredTrip) -> Table {
    let trip = &stored.trip;
    let mut table = new_table();

    table.add_row(vec!["Vehicle".to_string(), opt(&trip.vehicle_id)]);
    table.add_row(vec!["Route".to_string(), opt(&trip.route_id)]);
    table.add_row(vec!["Driver".to_string(), opt(&trip.driver_id)]);
    table.add_row(vec!["Status".to_string(), trip.status.clone()]);
    table.add_row(vec!["Start".to_string(), opt(&trip.start_time)]);
    table.add_row(vec!["End".to_string(), opt(&trip.end_time)]);
    table.add_row(vec!["Distance (km)".to_string(), opt(&trip.distance_km)]);
    table.add_row(vec!["Duration (min)".to_string(), opt(&trip.duration_minutes)]);
    table.add_row(vec!["Passengers".to_string(), trip.passenger_count.to_string()]);
    table.add_row(vec!["Stops served".to_string(), trip.stops_served.to_string()]);
    table.add_row(vec!["Positions".to_string(), trip.total_positions.to_string()]);
    table.add_row(vec!["Created".to_string(), stored.created_at.to_rfc3339()]);
    table.add_row(vec!["Updated".to_string(), stored.updated_at.to_rfc3339()]);

    table
}
