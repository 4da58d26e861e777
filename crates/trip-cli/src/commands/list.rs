//! `trip-migrate list` command implementation

use colored::Colorize;
use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, Table};

use trip_pipeline::Pipeline;

use crate::error::Result;
use crate::EXIT_OK;

/// List trips whose completion keys match `pattern`.
pub async fn run(pipeline: &Pipeline, pattern: Option<&str>) -> Result<i32> {
    let trips = pipeline.list_trips(pattern).await?;

    if trips.is_empty() {
        println!("No trips found.");
        return Ok(EXIT_OK);
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec!["Trip", "Start date"]);

    for identity in &trips {
        table.add_row(vec![identity.trip_id(), identity.start_date()]);
    }

    println!("{}", table);
    println!("{} {}", "Total trips:".cyan().bold(), trips.len());

    Ok(EXIT_OK)
}
