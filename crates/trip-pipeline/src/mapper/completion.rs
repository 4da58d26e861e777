//! Completion record mapping

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::{Map, Value};
use tracing::warn;

use trip_common::TripIdentity;

use super::TripCompletion;
use crate::error::{PipelineError, PipelineResult};
use crate::source::RawRecord;

pub const DEFAULT_STATUS: &str = "completed";

/// Epoch values above this are taken to be milliseconds.
const EPOCH_MILLIS_THRESHOLD: f64 = 1e11;

const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

/// Map a raw completion record onto [`TripCompletion`].
///
/// The trip id is mandatory and must agree with `identity`; every other field
/// is optional. Optional fields that fail coercion are logged, defaulted and
/// kept as text in the payload.
pub fn to_trip_completion(
    raw: RawRecord,
    identity: &TripIdentity,
) -> PipelineResult<TripCompletion> {
    let mut fields = Fields {
        raw,
        rejected: Map::new(),
        identity,
    };

    let trip_id = match fields.text("trip_id") {
        Some(id) => id,
        None => fields
            .text("id")
            .ok_or_else(|| PipelineError::schema(format!("{}: trip_id is missing", identity)))?,
    };
    if trip_id != identity.trip_id() {
        return Err(PipelineError::schema(format!(
            "{}: record carries trip_id '{}'",
            identity, trip_id
        )));
    }

    if let Some(date) = fields.text("start_date") {
        if date != identity.start_date() {
            warn!(trip = %identity, start_date = %date, "Record start_date differs from key");
            fields.reject("start_date", date);
        }
    }

    let start_time = fields.timestamp("start_time");
    let end_time = fields.timestamp("end_time");
    let duration_minutes = fields.float("duration_minutes");
    let duration_seconds = fields
        .integer("duration_seconds")
        .or_else(|| derive_duration_seconds(duration_minutes, start_time, end_time));

    let completion = TripCompletion {
        trip_id,
        vehicle_id: fields.text("vehicle_id"),
        route_id: fields.text("route_id"),
        route_short_name: fields.text("route_short_name"),
        route_long_name: fields.text("route_long_name"),
        driver_id: fields.text("driver_id"),
        license_plate: fields.text("license_plate"),
        service_date: fields.date("service_date"),
        start_time,
        end_time,
        scheduled_start_time: fields.text("scheduled_start_time"),
        scheduled_end_time: fields.text("scheduled_end_time"),
        completed_at: fields.timestamp("completed_at"),
        distance_km: fields.float("distance_km"),
        duration_minutes,
        duration_seconds,
        status: fields
            .text("status")
            .unwrap_or_else(|| DEFAULT_STATUS.to_string()),
        passenger_count: fields.count("passenger_count"),
        fare_amount: fields.float("fare_amount"),
        stops_served: fields.count("stops_served"),
        total_positions: fields.count("total_positions"),
        payload: Value::Null,
    };

    Ok(TripCompletion {
        payload: fields.into_payload(),
        ..completion
    })
}

fn derive_duration_seconds(
    minutes: Option<f64>,
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
) -> Option<i64> {
    if let Some(minutes) = minutes {
        return Some((minutes * 60.0).round() as i64);
    }
    match (start, end) {
        (Some(start), Some(end)) if end >= start => Some((end - start).num_seconds()),
        _ => None,
    }
}

/// Parse RFC 3339, naive `YYYY-MM-DD[ T]HH:MM:SS[.f]` (as UTC), or a unix
/// epoch in seconds or milliseconds.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }

    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(naive.and_utc());
        }
    }

    let epoch: f64 = raw.parse().ok().filter(|v: &f64| v.is_finite())?;
    let millis = if epoch.abs() > EPOCH_MILLIS_THRESHOLD {
        epoch
    } else {
        epoch * 1000.0
    };
    DateTime::from_timestamp_millis(millis.round() as i64)
}

/// Render a JSON value as the text a hash field would have held.
/// Null and empty strings count as absent.
pub(crate) fn value_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::Null => return None,
        Value::String(s) => s.trim().to_string(),
        other => other.to_string(),
    };
    (!text.is_empty()).then_some(text)
}

struct Fields<'a> {
    raw: RawRecord,
    rejected: Map<String, Value>,
    identity: &'a TripIdentity,
}

impl Fields<'_> {
    fn text(&mut self, name: &str) -> Option<String> {
        self.raw.remove(name).as_ref().and_then(value_text)
    }

    fn reject(&mut self, name: &str, text: String) {
        self.rejected.insert(name.to_string(), Value::String(text));
    }

    fn coerce<T>(&mut self, name: &str, expected: &str, parse: impl Fn(&str) -> Option<T>) -> Option<T> {
        let text = self.text(name)?;
        match parse(&text) {
            Some(v) => Some(v),
            None => {
                warn!(
                    trip = %self.identity,
                    field = name,
                    value = %text,
                    expected,
                    "Field failed coercion, using default"
                );
                self.reject(name, text);
                None
            }
        }
    }

    fn float(&mut self, name: &str) -> Option<f64> {
        self.coerce(name, "number", |s| s.parse::<f64>().ok().filter(|v| v.is_finite()))
    }

    fn integer(&mut self, name: &str) -> Option<i64> {
        self.coerce(name, "integer", |s| {
            s.parse::<i64>().ok().or_else(|| {
                s.parse::<f64>()
                    .ok()
                    .filter(|v| v.is_finite() && v.fract() == 0.0)
                    .map(|v| v as i64)
            })
        })
    }

    /// Counts default to 0 and must fit an INTEGER column.
    fn count(&mut self, name: &str) -> i32 {
        self.coerce(name, "integer", |s| {
            s.parse::<i64>().ok().and_then(|v| i32::try_from(v).ok())
        })
        .unwrap_or(0)
    }

    fn timestamp(&mut self, name: &str) -> Option<DateTime<Utc>> {
        self.coerce(name, "timestamp", parse_timestamp)
    }

    fn date(&mut self, name: &str) -> Option<NaiveDate> {
        self.coerce(name, "date", |s| {
            NaiveDate::parse_from_str(s, "%Y%m%d")
                .or_else(|_| NaiveDate::parse_from_str(s, "%Y-%m-%d"))
                .ok()
        })
    }

    /// Unmodelled fields keep their original JSON value; rejected fields keep
    /// their text.
    fn into_payload(self) -> Value {
        let mut payload: Map<String, Value> = self.raw.into_iter().collect();
        payload.extend(self.rejected);
        Value::Object(payload)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn identity() -> TripIdentity {
        TripIdentity::new("21520", "20250901").unwrap()
    }

    fn record(pairs: &[(&str, Value)]) -> RawRecord {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_maps_hash_strings() {
        let raw = record(&[
            ("trip_id", json!("21520")),
            ("vehicle_id", json!("V-7")),
            ("distance_km", json!("12.4")),
            ("duration_minutes", json!("35")),
            ("passenger_count", json!("18")),
            ("start_time", json!("2025-09-01T08:00:00Z")),
            ("service_date", json!("20250901")),
        ]);

        let trip = to_trip_completion(raw, &identity()).unwrap();
        assert_eq!(trip.trip_id, "21520");
        assert_eq!(trip.vehicle_id.as_deref(), Some("V-7"));
        assert_eq!(trip.distance_km, Some(12.4));
        assert_eq!(trip.duration_minutes, Some(35.0));
        assert_eq!(trip.duration_seconds, Some(2100));
        assert_eq!(trip.passenger_count, 18);
        assert_eq!(trip.status, "completed");
        assert_eq!(trip.stops_served, 0);
        assert_eq!(
            trip.start_time,
            Some(Utc.with_ymd_and_hms(2025, 9, 1, 8, 0, 0).unwrap())
        );
        assert_eq!(trip.service_date, NaiveDate::from_ymd_opt(2025, 9, 1));
        assert_eq!(trip.payload, json!({}));
    }

    #[test]
    fn test_json_numbers_and_id_fallback() {
        let raw = record(&[
            ("id", json!(21520)),
            ("fare_amount", json!(3.5)),
            ("stops_served", json!(12)),
        ]);
        let trip = to_trip_completion(raw, &identity()).unwrap();
        assert_eq!(trip.trip_id, "21520");
        assert_eq!(trip.fare_amount, Some(3.5));
        assert_eq!(trip.stops_served, 12);
    }

    #[test]
    fn test_missing_trip_id_is_schema_violation() {
        let raw = record(&[("vehicle_id", json!("V-7")), ("trip_id", json!(""))]);
        let err = to_trip_completion(raw, &identity()).unwrap_err();
        assert_eq!(err.kind(), "schema_violation");
    }

    #[test]
    fn test_mismatched_trip_id_is_schema_violation() {
        let raw = record(&[("trip_id", json!("99999"))]);
        assert!(to_trip_completion(raw, &identity()).is_err());
    }

    #[test]
    fn test_unknown_and_rejected_fields_go_to_payload() {
        let raw = record(&[
            ("trip_id", json!("21520")),
            ("distance_km", json!("far")),
            ("weather", json!("rain")),
            ("tags", json!(["express"])),
        ]);
        let trip = to_trip_completion(raw, &identity()).unwrap();
        assert_eq!(trip.distance_km, None);
        assert_eq!(
            trip.payload,
            json!({"distance_km": "far", "weather": "rain", "tags": ["express"]})
        );
    }

    #[test]
    fn test_duration_derived_from_time_bounds() {
        let raw = record(&[
            ("trip_id", json!("21520")),
            ("start_time", json!("1756713600")),
            ("end_time", json!("1756715700000")),
        ]);
        let trip = to_trip_completion(raw, &identity()).unwrap();
        assert_eq!(trip.duration_seconds, Some(2100));
    }

    #[test]
    fn test_explicit_status_and_bad_count() {
        let raw = record(&[
            ("trip_id", json!("21520")),
            ("status", json!("cancelled")),
            ("total_positions", json!("lots")),
        ]);
        let trip = to_trip_completion(raw, &identity()).unwrap();
        assert_eq!(trip.status, "cancelled");
        assert_eq!(trip.total_positions, 0);
        assert_eq!(trip.payload["total_positions"], json!("lots"));
    }

    #[test]
    fn test_parse_timestamp_formats() {
        let expected = Utc.with_ymd_and_hms(2025, 9, 1, 8, 0, 0).unwrap();
        assert_eq!(parse_timestamp("2025-09-01T08:00:00Z"), Some(expected));
        assert_eq!(parse_timestamp("2025-09-01T10:00:00+02:00"), Some(expected));
        assert_eq!(parse_timestamp("2025-09-01 08:00:00"), Some(expected));
        assert_eq!(parse_timestamp("2025-09-01T08:00:00.000"), Some(expected));
        assert_eq!(parse_timestamp("1756713600"), Some(expected));
        assert_eq!(parse_timestamp("1756713600000"), Some(expected));
        assert_eq!(parse_timestamp("yesterday"), None);
        assert_eq!(parse_timestamp("NaN"), None);
    }
}
