//! Source store access
//!
//! The source holds, per trip, a completion record and a stream of track
//! points. [`SourceStore`] is the seam between the orchestrator and the store;
//! [`RedisSourceStore`] talks to Redis and [`InMemorySourceStore`] backs tests
//! and dry runs.

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde_json::Value;
use std::collections::BTreeMap;

use trip_common::TripIdentity;

use crate::error::PipelineResult;

pub mod key;
pub mod memory;
pub mod redis;

pub use key::{KeyLayout, KeyRole, TripKey};
pub use memory::InMemorySourceStore;
pub use self::redis::RedisSourceStore;

/// Field name used when a completion record is not a JSON object.
pub const RAW_DATA_FIELD: &str = "raw_data";

/// Completion record as stored: field name to value. Hash records only carry
/// strings; JSON string records can carry any JSON value.
pub type RawRecord = BTreeMap<String, Value>;

/// One stream entry, in stream order.
#[derive(Debug, Clone, PartialEq)]
pub struct RawEntry {
    /// Stream entry id, `<millis>-<seq>`
    pub id: String,
    pub fields: BTreeMap<String, String>,
}

impl RawEntry {
    pub fn new<K, V>(id: impl Into<String>, fields: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            id: id.into(),
            fields: fields
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// Read access to trips in the source store, plus the explicit purge.
#[async_trait]
pub trait SourceStore: Send + Sync {
    /// Key layout used to build and parse this store's keys
    fn layout(&self) -> &KeyLayout;

    /// Lazily enumerate raw completion keys matching a glob pattern.
    ///
    /// The stream is finite and may yield the same key twice; callers dedupe.
    fn discover_trips(&self, pattern: &str) -> BoxStream<'static, PipelineResult<String>>;

    /// Completion record for a trip. `NotFound` when there is none.
    async fn fetch_completion(&self, identity: &TripIdentity) -> PipelineResult<RawRecord>;

    /// All track entries from the start of the stream, in insertion order.
    ///
    /// `NotFound` when the stream does not exist; an existing empty stream
    /// yields an empty vector.
    async fn fetch_track(&self, identity: &TripIdentity) -> PipelineResult<Vec<RawEntry>>;

    /// Remove the completion record, the stream and the status key.
    /// Deleting a trip that is already gone succeeds.
    async fn delete_trip(&self, identity: &TripIdentity) -> PipelineResult<()>;
}

/// Interpret a string-valued completion record.
///
/// A JSON object becomes its fields; anything else (other JSON, or text that
/// is not JSON at all) is kept whole under [`RAW_DATA_FIELD`].
pub fn parse_json_record(body: &str) -> RawRecord {
    match serde_json::from_str::<Value>(body) {
        Ok(Value::Object(map)) => map.into_iter().collect(),
        _ => {
            let mut record = RawRecord::new();
            record.insert(RAW_DATA_FIELD.to_string(), Value::String(body.to_string()));
            record
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_json_object_record() {
        let record = parse_json_record(r#"{"trip_id":"21520","distance_km":12.4}"#);
        assert_eq!(record.get("trip_id"), Some(&json!("21520")));
        assert_eq!(record.get("distance_km"), Some(&json!(12.4)));
    }

    #[test]
    fn test_non_object_json_is_kept_raw() {
        let record = parse_json_record("[1,2,3]");
        assert_eq!(record.len(), 1);
        assert_eq!(record.get(RAW_DATA_FIELD), Some(&json!("[1,2,3]")));
    }

    #[test]
    fn test_invalid_json_is_kept_raw() {
        let record = parse_json_record("trip finished ok");
        assert_eq!(record.get(RAW_DATA_FIELD), Some(&json!("trip finished ok")));
    }

    #[test]
    fn test_raw_entry_new() {
        let entry = RawEntry::new("1756700000000-0", [("latitude", "1.5"), ("longitude", "2.5")]);
        assert_eq!(entry.id, "1756700000000-0");
        assert_eq!(entry.fields.get("latitude").map(String::as_str), Some("1.5"));
    }
}
