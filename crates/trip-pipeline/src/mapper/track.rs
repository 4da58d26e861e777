//! Track stream mapping

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use tracing::warn;

use super::completion::parse_timestamp;
use super::TrackPoint;
use crate::source::RawEntry;

const LATITUDE: &str = "latitude";
const LONGITUDE: &str = "longitude";
const SPEED: &str = "speed";
const HEADING: &str = "heading";
const DEVICE_TIME: &str = "timestamp";

/// Map stream entries to track points, preserving order.
///
/// Entries with a missing or unusable position are dropped with a warning;
/// they never fail the trip.
pub fn to_track_points(entries: Vec<RawEntry>) -> Vec<TrackPoint> {
    let total = entries.len();
    let points: Vec<TrackPoint> = entries
        .into_iter()
        .filter_map(|entry| match to_track_point(entry) {
            Ok(point) => Some(point),
            Err((id, reason)) => {
                warn!(message_id = %id, reason = %reason, "Skipping malformed track entry");
                None
            }
        })
        .collect();

    if points.len() < total {
        warn!(
            kept = points.len(),
            skipped = total - points.len(),
            "Track stream had malformed entries"
        );
    }

    points
}

fn to_track_point(entry: RawEntry) -> Result<TrackPoint, (String, String)> {
    let RawEntry { id, mut fields } = entry;

    let received_at = match entry_time(&id) {
        Some(t) => t,
        None => return Err((id, "entry id is not <millis>-<seq>".to_string())),
    };

    let latitude = match coordinate(fields.remove(LATITUDE), 90.0) {
        Ok(v) => v,
        Err(reason) => return Err((id, format!("latitude {}", reason))),
    };
    let longitude = match coordinate(fields.remove(LONGITUDE), 180.0) {
        Ok(v) => v,
        Err(reason) => return Err((id, format!("longitude {}", reason))),
    };

    let mut extra = Map::new();
    let speed = optional_number(&mut fields, SPEED, &mut extra);
    let heading = optional_number(&mut fields, HEADING, &mut extra);
    let device_time = match fields.remove(DEVICE_TIME) {
        Some(raw) => match parse_timestamp(&raw) {
            Some(t) => Some(t),
            None => {
                extra.insert(DEVICE_TIME.to_string(), Value::String(raw));
                None
            }
        },
        None => None,
    };

    extra.extend(fields.into_iter().map(|(k, v)| (k, Value::String(v))));

    Ok(TrackPoint {
        message_id: id,
        received_at,
        latitude,
        longitude,
        speed,
        heading,
        device_time,
        extra: Value::Object(extra),
    })
}

/// Milliseconds before the `-` of a stream entry id.
fn entry_time(id: &str) -> Option<DateTime<Utc>> {
    let (millis, seq) = id.split_once('-')?;
    seq.parse::<u64>().ok()?;
    DateTime::from_timestamp_millis(millis.parse().ok()?)
}

fn coordinate(raw: Option<String>, limit: f64) -> Result<f64, String> {
    let raw = raw.ok_or_else(|| "is missing".to_string())?;
    let value: f64 = raw
        .trim()
        .parse()
        .map_err(|_| format!("'{}' is not a number", raw))?;
    if !value.is_finite() || value.abs() > limit {
        return Err(format!("{} is out of range", value));
    }
    Ok(value)
}

/// Typed optional column. Unparseable text stays in `extra`.
fn optional_number(
    fields: &mut std::collections::BTreeMap<String, String>,
    name: &str,
    extra: &mut Map<String, Value>,
) -> Option<f64> {
    let raw = fields.remove(name)?;
    if raw.trim().is_empty() {
        return None;
    }
    match raw.trim().parse::<f64>() {
        Ok(v) if v.is_finite() => Some(v),
        _ => {
            extra.insert(name.to_string(), Value::String(raw));
            None
        }
    }
}
