//! In-memory source store for tests and local dry runs

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use trip_common::TripIdentity;

use super::{KeyLayout, KeyRole, RawEntry, RawRecord, SourceStore};
use crate::error::{PipelineError, PipelineResult};

#[derive(Default)]
struct Inner {
    records: BTreeMap<String, RawRecord>,
    streams: BTreeMap<String, Vec<RawEntry>>,
}

/// Keys live in ordered maps, so discovery order is deterministic.
#[derive(Clone, Default)]
pub struct InMemorySourceStore {
    inner: Arc<RwLock<Inner>>,
    layout: KeyLayout,
}

impl InMemorySourceStore {
    pub fn new(layout: KeyLayout) -> Self {
        Self {
            inner: Arc::default(),
            layout,
        }
    }

    pub async fn put_completion(&self, identity: &TripIdentity, record: RawRecord) {
        let key = self.layout.format(identity, KeyRole::Completion);
        self.put_raw_completion(key, record).await;
    }

    /// Store a completion record under an arbitrary key, valid or not.
    pub async fn put_raw_completion(&self, key: impl Into<String>, record: RawRecord) {
        self.inner.write().await.records.insert(key.into(), record);
    }

    /// Create (or replace) the trip's stream. An empty vector is an existing,
    /// empty stream.
    pub async fn put_track(&self, identity: &TripIdentity, entries: Vec<RawEntry>) {
        let key = self.layout.format(identity, KeyRole::Track);
        self.inner.write().await.streams.insert(key, entries);
    }

    pub async fn contains_trip(&self, identity: &TripIdentity) -> bool {
        let inner = self.inner.read().await;
        inner
            .records
            .contains_key(&self.layout.format(identity, KeyRole::Completion))
            || inner
                .streams
                .contains_key(&self.layout.format(identity, KeyRole::Track))
    }
}

#[async_trait]
impl SourceStore for InMemorySourceStore {
    fn layout(&self) -> &KeyLayout {
        &self.layout
    }

    fn discover_trips(&self, pattern: &str) -> BoxStream<'static, PipelineResult<String>> {
        let inner = Arc::clone(&self.inner);
        let pattern = pattern.to_string();

        stream::once(async move {
            let keys: Vec<PipelineResult<String>> = inner
                .read()
                .await
                .records
                .keys()
                .filter(|k| glob_match(&pattern, k))
                .cloned()
                .map(Ok)
                .collect();
            stream::iter(keys)
        })
        .flatten()
        .boxed()
    }

    async fn fetch_completion(&self, identity: &TripIdentity) -> PipelineResult<RawRecord> {
        let key = self.layout.format(identity, KeyRole::Completion);
        self.inner
            .read()
            .await
            .records
            .get(&key)
            .cloned()
            .ok_or_else(|| PipelineError::not_found("completion record", &key))
    }

    async fn fetch_track(&self, identity: &TripIdentity) -> PipelineResult<Vec<RawEntry>> {
        let key = self.layout.format(identity, KeyRole::Track);
        self.inner
            .read()
            .await
            .streams
            .get(&key)
            .cloned()
            .ok_or_else(|| PipelineError::not_found("track stream", &key))
    }

    async fn delete_trip(&self, identity: &TripIdentity) -> PipelineResult<()> {
        let mut inner = self.inner.write().await;
        inner
            .records
            .remove(&self.layout.format(identity, KeyRole::Completion));
        inner
            .streams
            .remove(&self.layout.format(identity, KeyRole::Track));
        Ok(())
    }
}

/// Redis-style glob with `*` and `?`.
fn glob_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    let (mut pi, mut ti) = (0, 0);
    let mut star: Option<(usize, usize)> = None;

    while ti < t.len() {
        if pi < p.len() && (p[pi] == '?' || p[pi] == t[ti]) {
            pi += 1;
            ti += 1;
        } else if pi < p.len() && p[pi] == '*' {
            star = Some((pi, ti));
            pi += 1;
        } else if let Some((sp, st)) = star {
            pi = sp + 1;
            ti = st + 1;
            star = Some((sp, st + 1));
        } else {
            return false;
        }
    }

    p[pi..].iter().all(|&c| c == '*')
}
