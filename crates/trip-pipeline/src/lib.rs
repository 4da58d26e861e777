//! Trip archive pipeline
//!
//! Moves completed trips out of Redis into durable storage: the trip summary
//! into PostgreSQL, the position track into one Parquet file per run. Progress
//! is tracked in an append-only processing ledger so that re-runs skip what is
//! already done and pick up what failed.
//!
//! # Modules
//!
//! - [`source`]: key layout and the Redis source store
//! - [`mapper`]: raw fields to typed records
//! - [`ledger`]: processing log
//! - [`sink`]: relational, columnar and archive writers
//! - [`pipeline`]: the orchestrator
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//! use trip_pipeline::{
//!     config::PipelineSettings,
//!     ledger::InMemoryLedger,
//!     pipeline::Pipeline,
//!     sink::{InMemoryTripSink, ParquetTrackWriter},
//!     source::InMemorySourceStore,
//! };
//!
//! # async fn run() -> trip_pipeline::PipelineResult<()> {
//! let pipeline = Pipeline::new(
//!     Arc::new(InMemorySourceStore::default()),
//!     Arc::new(InMemoryLedger::new()),
//!     Arc::new(InMemoryTripSink::new()),
//!     Arc::new(ParquetTrackWriter::new("./output/parquet")?),
//!     PipelineSettings::default(),
//! );
//!
//! let report = pipeline.process_all(None, &CancellationToken::new()).await;
//! println!("{} trips, {} failed", report.total(), report.failed());
//! # Ok(())
//! # }
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod config;
pub mod db;
pub mod error;
pub mod ledger;
pub mod mapper;
pub mod pipeline;
pub mod sink;
pub mod source;

pub use error::{PipelineError, PipelineResult};
pub use pipeline::{BatchReport, Pipeline, TripOutcome};
