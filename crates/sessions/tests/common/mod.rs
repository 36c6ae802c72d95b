#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;

use sc_domain::config::{ClusterConfig, ReplicationMode};
use sc_domain::error::{Error, Result};
use sc_sessions::{ClusterManager, InMemorySessionStore, SessionRecord, SessionStore, StoredAttribute};

/// In-memory store that records every call.
#[derive(Default)]
pub struct RecordingStore {
    pub inner: InMemorySessionStore,
    pub puts: Mutex<Vec<(String, ReplicationMode)>>,
    pub removes: Mutex<Vec<String>>,
    pub gets: AtomicUsize,
    pub fail_gets: AtomicBool,
}

impl RecordingStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn put_count(&self, id: &str) -> usize {
        self.puts.lock().iter().filter(|(k, _)| k == id).count()
    }

    pub fn removed(&self, id: &str) -> bool {
        self.removes.lock().iter().any(|k| k == id)
    }

    /// Write a record directly, as another node would.  Not counted as a
    /// put.
    pub async fn seed(&self, record: &SessionRecord) {
        let blob = record.encode().unwrap();
        self.inner
            .put(&record.id, blob, ReplicationMode::Sync)
            .await
            .unwrap();
    }
}

#[async_trait]
impl SessionStore for RecordingStore {
    async fn put(&self, id: &str, blob: Vec<u8>, mode: ReplicationMode) -> Result<()> {
        self.puts.lock().push((id.to_owned(), mode));
        self.inner.put(id, blob, mode).await
    }

    async fn get(&self, id: &str) -> Result<Option<Vec<u8>>> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        if self.fail_gets.load(Ordering::SeqCst) {
            return Err(Error::Store("store unreachable".into()));
        }
        self.inner.get(id).await
    }

    async fn remove(&self, id: &str) -> Result<()> {
        self.removes.lock().push(id.to_owned());
        self.inner.remove(id).await
    }

    fn new_id(&self) -> String {
        self.inner.new_id()
    }
}

pub fn node(route: Option<&str>, store: Arc<RecordingStore>) -> Arc<ClusterManager> {
    let config = ClusterConfig {
        route_tag: route.map(String::from),
        max_inactive_interval_secs: 60,
        ..Default::default()
    };
    ClusterManager::new(config, store)
}

/// A record last accessed `idle_secs` ago.
pub fn record(id: &str, idle_secs: i64, max_inactive: i64) -> SessionRecord {
    let last: DateTime<Utc> = Utc::now() - Duration::seconds(idle_secs);
    let mut attributes = BTreeMap::new();
    attributes.insert(
        "user".to_string(),
        StoredAttribute {
            kind: None,
            value: serde_json::json!("alice"),
        },
    );
    SessionRecord {
        id: id.to_owned(),
        creation_time: last - Duration::seconds(10),
        last_accessed_time: last,
        max_inactive_interval: max_inactive,
        is_new: false,
        valid: true,
        attributes,
    }
}

/// Wait until `cond` holds, for async store removals.
pub async fn eventually(cond: impl Fn() -> bool) -> bool {
    for _ in 0..100 {
        if cond() {
            return true;
        }
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }
    cond()
}
