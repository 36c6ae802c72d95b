//! Distributed session store contract.
//!
//! The cluster treats the store as an opaque replicated map from session
//! id to serialized [`SessionRecord`](crate::record::SessionRecord) blob.
//! Implementations may be an in-memory map, a shared directory, a quorum
//! KV store, or anything else that honours [`ReplicationMode`].

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use sc_domain::config::ReplicationMode;
use sc_domain::error::Result;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Store trait
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Push a session blob.  `Sync` returns once the store acknowledged the
    /// write; `Async` may return before it is visible to other nodes.
    async fn put(&self, id: &str, blob: Vec<u8>, mode: ReplicationMode) -> Result<()>;

    async fn get(&self, id: &str) -> Result<Option<Vec<u8>>>;

    async fn remove(&self, id: &str) -> Result<()>;

    /// Mint a fresh opaque session id (without a route suffix).
    fn new_id(&self) -> String;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// In-memory store
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Process-local store.  Every write is immediately visible, so both
/// replication modes behave the same.  Share one instance between several
/// managers to simulate a cluster inside a single process.
#[derive(Default)]
pub struct InMemorySessionStore {
    entries: RwLock<HashMap<String, Vec<u8>>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.read().contains_key(id)
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn put(&self, id: &str, blob: Vec<u8>, _mode: ReplicationMode) -> Result<()> {
        self.entries.write().insert(id.to_owned(), blob);
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.entries.read().get(id).cloned())
    }

    async fn remove(&self, id: &str) -> Result<()> {
        self.entries.write().remove(id);
        Ok(())
    }

    fn new_id(&self) -> String {
        uuid::Uuid::new_v4().simple().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_get_remove() {
        let store = InMemorySessionStore::new();
        store
            .put("s1", b"blob".to_vec(), ReplicationMode::Sync)
            .await
            .unwrap();
        assert_eq!(store.get("s1").await.unwrap().as_deref(), Some(&b"blob"[..]));
        assert!(store.contains("s1"));

        store.remove("s1").await.unwrap();
        assert!(store.get("s1").await.unwrap().is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn new_ids_have_no_route_separator() {
        let store = InMemorySessionStore::new();
        let a = store.new_id();
        let b = store.new_id();
        assert_ne!(a, b);
        assert!(!a.contains('.'));
    }
}
