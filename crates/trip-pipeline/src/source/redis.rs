//! Redis-backed source store

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use redis::aio::ConnectionManager;
use redis::streams::StreamRangeReply;
use redis::AsyncCommands;
use std::collections::{BTreeMap, HashMap, VecDeque};
use tracing::{debug, info, instrument};

use trip_common::TripIdentity;

use super::{parse_json_record, KeyLayout, KeyRole, RawEntry, RawRecord, SourceStore};
use crate::config::SourceConfig;
use crate::error::{PipelineError, PipelineResult};

/// Source store over a multiplexed, auto-reconnecting Redis connection.
#[derive(Clone)]
pub struct RedisSourceStore {
    conn: ConnectionManager,
    layout: KeyLayout,
    scan_count: usize,
    page_size: usize,
}

impl RedisSourceStore {
    pub async fn connect(config: &SourceConfig) -> PipelineResult<Self> {
        let client = redis::Client::open(config.url.as_str())
            .map_err(|e| PipelineError::Config(format!("invalid Redis URL: {}", e)))?;

        let conn = ConnectionManager::new(client)
            .await
            .map_err(PipelineError::from_redis)?;

        info!(
            prefix = %config.key_prefix,
            scan_count = config.scan_count,
            page_size = config.stream_page_size,
            "Connected to Redis"
        );

        Ok(Self {
            conn,
            layout: KeyLayout::new(config.key_prefix.clone()),
            scan_count: config.scan_count,
            page_size: config.stream_page_size,
        })
    }

    pub async fn ping(&self) -> PipelineResult<()> {
        let mut conn = self.conn.clone();
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(PipelineError::from_redis)?;
        Ok(())
    }
}

struct ScanState {
    conn: ConnectionManager,
    pattern: String,
    count: usize,
    cursor: u64,
    buffer: VecDeque<String>,
    finished: bool,
}

#[async_trait]
impl SourceStore for RedisSourceStore {
    fn layout(&self) -> &KeyLayout {
        &self.layout
    }

    fn discover_trips(&self, pattern: &str) -> BoxStream<'static, PipelineResult<String>> {
        let state = ScanState {
            conn: self.conn.clone(),
            pattern: pattern.to_string(),
            count: self.scan_count,
            cursor: 0,
            buffer: VecDeque::new(),
            finished: false,
        };

        // One SCAN page per refill; the cursor returning to 0 ends the walk.
        stream::unfold(state, |mut st| async move {
            loop {
                if let Some(key) = st.buffer.pop_front() {
                    return Some((Ok(key), st));
                }
                if st.finished {
                    return None;
                }

                let page: redis::RedisResult<(u64, Vec<String>)> = redis::cmd("SCAN")
                    .arg(st.cursor)
                    .arg("MATCH")
                    .arg(&st.pattern)
                    .arg("COUNT")
                    .arg(st.count)
                    .query_async(&mut st.conn)
                    .await;

                match page {
                    Ok((next, keys)) => {
                        debug!(cursor = st.cursor, next, found = keys.len(), "SCAN page");
                        st.cursor = next;
                        st.finished = next == 0;
                        st.buffer.extend(keys);
                    }
                    Err(e) => {
                        st.finished = true;
                        return Some((Err(PipelineError::from_redis(e)), st));
                    }
                }
            }
        })
        .boxed()
    }

    #[instrument(skip(self), fields(trip = %identity))]
    async fn fetch_completion(&self, identity: &TripIdentity) -> PipelineResult<RawRecord> {
        let key = self.layout.format(identity, KeyRole::Completion);
        let mut conn = self.conn.clone();

        let kind: String = redis::cmd("TYPE")
            .arg(&key)
            .query_async(&mut conn)
            .await
            .map_err(PipelineError::from_redis)?;

        match kind.as_str() {
            "none" => Err(PipelineError::not_found("completion record", &key)),
            "hash" => {
                let fields: HashMap<String, String> =
                    conn.hgetall(&key).await.map_err(PipelineError::from_redis)?;
                Ok(fields
                    .into_iter()
                    .map(|(k, v)| (k, serde_json::Value::String(v)))
                    .collect())
            }
            "string" => {
                let body: String = conn.get(&key).await.map_err(PipelineError::from_redis)?;
                Ok(parse_json_record(&body))
            }
            other => Err(PipelineError::schema(format!(
                "completion record '{}' is a {}, expected hash or string",
                key, other
            ))),
        }
    }

    #[instrument(skip(self), fields(trip = %identity))]
    async fn fetch_track(&self, identity: &TripIdentity) -> PipelineResult<Vec<RawEntry>> {
        let key = self.layout.format(identity, KeyRole::Track);
        let mut conn = self.conn.clone();

        let exists: bool = conn.exists(&key).await.map_err(PipelineError::from_redis)?;
        if !exists {
            return Err(PipelineError::not_found("track stream", &key));
        }

        let mut entries = Vec::new();
        let mut start = "-".to_string();

        loop {
            let page: StreamRangeReply = conn
                .xrange_count(&key, &start, "+", self.page_size)
                .await
                .map_err(PipelineError::from_redis)?;

            let fetched = page.ids.len();
            for entry in page.ids {
                let mut fields = BTreeMap::new();
                for (field, value) in entry.map {
                    let value: String =
                        redis::from_redis_value(&value).map_err(PipelineError::from_redis)?;
                    fields.insert(field, value);
                }
                start = format!("({}", entry.id);
                entries.push(RawEntry {
                    id: entry.id,
                    fields,
                });
            }

            if fetched < self.page_size {
                break;
            }
        }

        debug!(entries = entries.len(), "Fetched track stream");
        Ok(entries)
    }

    #[instrument(skip(self), fields(trip = %identity))]
    async fn delete_trip(&self, identity: &TripIdentity) -> PipelineResult<()> {
        let keys = [
            self.layout.format(identity, KeyRole::Completion),
            self.layout.format(identity, KeyRole::Track),
            self.layout.status_key(identity),
        ];
        let mut conn = self.conn.clone();

        let removed: i64 = conn.del(&keys[..]).await.map_err(PipelineError::from_redis)?;
        info!(removed, "Deleted trip from source");
        Ok(())
    }
}
