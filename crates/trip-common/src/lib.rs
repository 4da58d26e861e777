//! Trip Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared types, logging setup, and error handling for the trip archive
//! workspace.
//!
//! # Overview
//!
//! - **Types**: the trip identity and ledger status shared by every crate
//! - **Logging**: `tracing` subscriber configuration (console, rolling file, JSON)
//! - **Errors**: validation errors raised by the shared types
//!
//! # Example
//!
//! ```no_run
//! use trip_common::{Result, TripIdentity};
//!
//! fn identity() -> Result<TripIdentity> {
//!     TripIdentity::new("21520", "20250901")
//! }
//! ```

pub mod error;
pub mod logging;
pub mod types;

// Re-export commonly used types
pub use error::{CommonError, Result};
pub use types::{ProcessingStatus, TripIdentity};
