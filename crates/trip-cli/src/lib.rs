//! Trip archive CLI
//!
//! `trip-migrate` moves completed trips out of Redis into PostgreSQL and
//! Parquet, one trip or a whole batch at a time.
//!
//! - `process <trip-id> <start-date>`: migrate a single trip
//! - `process-all`: discover and migrate every trip matching a pattern
//! - `list`: show discovered trips without processing them
//! - `show <trip-id> <start-date>`: ledger history, stored row and artifacts
//! - `purge <trip-id> <start-date>`: delete a migrated trip from Redis

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod commands;
pub mod context;
pub mod error;
pub mod progress;

pub use error::{CliError, Result};

use clap::{Parser, Subcommand};

/// Process exit status: every trip succeeded.
pub const EXIT_OK: i32 = 0;

/// Process exit status: at least one trip failed, or the command failed.
pub const EXIT_FAILURE: i32 = 1;

/// Process exit status: the batch was interrupted with Ctrl+C.
pub const EXIT_CANCELLED: i32 = 130;

/// Trip archive migration tool
#[derive(Parser, Debug)]
#[command(name = "trip-migrate")]
#[command(author, version, about, long_about = None)]
#[command(arg_required_else_help = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// Available CLI commands
#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Commands {
    /// Migrate a single trip
    Process {
        /// Trip identifier
        trip_id: String,

        /// Trip start date (YYYYMMDD)
        start_date: String,
    },

    /// Discover and migrate every matching trip
    ProcessAll {
        /// Key pattern to scan (defaults to every completion key)
        #[arg(short, long)]
        pattern: Option<String>,

        /// Number of trips processed at once
        #[arg(short, long, value_parser = clap::value_parser!(u16).range(1..))]
        concurrency: Option<u16>,
    },

    /// List discovered trips without processing them
    List {
        /// Key pattern to scan (defaults to every completion key)
        #[arg(short, long)]
        pattern: Option<String>,
    },

    /// Show ledger history, stored row and artifacts of a trip
    Show {
        /// Trip identifier
        trip_id: String,

        /// Trip start date (YYYYMMDD)
        start_date: String,
    },

    /// Delete a migrated trip's keys from Redis
    Purge {
        /// Trip identifier
        trip_id: String,

        /// Trip start date (YYYYMMDD)
        start_date: String,

        /// Purge even if the trip has not completed
        #[arg(short, long)]
        force: bool,
    },
}
