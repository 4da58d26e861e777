//! Record mapping
//!
//! Raw source data comes in as string (or loosely typed JSON) field maps. The
//! mapper validates it once, at this boundary, and produces typed records the
//! sinks can write without further checks.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

pub mod completion;
pub mod track;

pub use completion::to_trip_completion;
pub use track::to_track_points;

/// Trip-level metadata destined for the `trips` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TripCompletion {
    pub trip_id: String,
    pub vehicle_id: Option<String>,
    pub route_id: Option<String>,
    pub route_short_name: Option<String>,
    pub route_long_name: Option<String>,
    pub driver_id: Option<String>,
    pub license_plate: Option<String>,
    pub service_date: Option<NaiveDate>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    /// Schedule times are kept as text: GTFS allows values past 24:00:00.
    pub scheduled_start_time: Option<String>,
    pub scheduled_end_time: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
    pub distance_km: Option<f64>,
    pub duration_minutes: Option<f64>,
    pub duration_seconds: Option<i64>,
    pub status: String,
    pub passenger_count: i32,
    pub fare_amount: Option<f64>,
    pub stops_served: i32,
    pub total_positions: i32,
    /// Every field the mapper does not model, verbatim
    pub payload: serde_json::Value,
}

/// One position sample from a trip's track stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackPoint {
    /// Stream entry id
    pub message_id: String,
    /// Receive time encoded in the entry id
    pub received_at: DateTime<Utc>,
    pub latitude: f64,
    pub longitude: f64,
    pub speed: Option<f64>,
    pub heading: Option<f64>,
    /// Time reported by the device, if the entry carried one
    pub device_time: Option<DateTime<Utc>>,
    /// Remaining fields as a JSON object
    pub extra: serde_json::Value,
}
