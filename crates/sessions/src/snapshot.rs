//! Snapshot strategies: decide *when* a touched session is pushed to the
//! store.
//!
//! - [`InstantSnapshotManager`]: push right after every request.
//! - [`IntervalSnapshotManager`]: collect ids and push them in batches on a
//!   timer, so a hot session is replicated at most once per interval.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use sc_domain::config::SnapshotMode;
use sc_domain::trace::TraceEvent;

use crate::manager::ClusterManager;
use crate::worker::PeriodicTask;

#[async_trait]
pub trait SnapshotManager: Send + Sync {
    /// Called after each request that touched `session_id`.
    async fn snapshot(&self, session_id: &str);

    fn start(&self);

    async fn stop(&self);
}

/// Build the strategy selected by the manager's configuration.
pub fn snapshot_manager_for(manager: Arc<ClusterManager>) -> Arc<dyn SnapshotManager> {
    match manager.config().snapshot_mode {
        SnapshotMode::Instant => Arc::new(InstantSnapshotManager::new(manager)),
        SnapshotMode::Interval => {
            let interval = Duration::from_millis(manager.config().snapshot_interval_ms);
            Arc::new(IntervalSnapshotManager::new(manager, interval))
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Instant
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct InstantSnapshotManager {
    manager: Arc<ClusterManager>,
}

impl InstantSnapshotManager {
    pub fn new(manager: Arc<ClusterManager>) -> Self {
        Self { manager }
    }
}

#[async_trait]
impl SnapshotManager for InstantSnapshotManager {
    async fn snapshot(&self, session_id: &str) {
        let Some(session) = self.manager.find_local(session_id) else {
            tracing::debug!(session_id, "snapshot skipped, session no longer cached");
            return;
        };
        if let Err(e) = self.manager.store_session(&session).await {
            tracing::warn!(session_id, error = %e, "session snapshot failed");
        }
    }

    fn start(&self) {}

    async fn stop(&self) {}
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Interval
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct IntervalSnapshotManager {
    manager: Arc<ClusterManager>,
    interval: Duration,
    /// Ids only; sessions are re-resolved from the cache at flush time.
    pending: Arc<Mutex<HashSet<String>>>,
    task: Mutex<Option<PeriodicTask>>,
}

impl IntervalSnapshotManager {
    pub fn new(manager: Arc<ClusterManager>, interval: Duration) -> Self {
        Self {
            manager,
            interval,
            pending: Arc::new(Mutex::new(HashSet::new())),
            task: Mutex::new(None),
        }
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    /// Push every pending session now.  Returns how many were pushed.
    pub async fn flush(&self) -> usize {
        flush_pending(&self.manager, &self.pending).await
    }
}

async fn flush_pending(manager: &ClusterManager, pending: &Mutex<HashSet<String>>) -> usize {
    let batch = std::mem::take(&mut *pending.lock());
    if batch.is_empty() {
        return 0;
    }

    let mut pushed = 0;
    for id in &batch {
        let Some(session) = manager.find_local(id) else {
            continue;
        };
        match manager.store_session(&session).await {
            Ok(true) => pushed += 1,
            Ok(false) => {}
            Err(e) => tracing::warn!(session_id = %id, error = %e, "interval snapshot failed"),
        }
    }

    TraceEvent::SnapshotFlushed {
        pending: batch.len(),
        pushed,
    }
    .emit();
    pushed
}

#[async_trait]
impl SnapshotManager for IntervalSnapshotManager {
    async fn snapshot(&self, session_id: &str) {
        self.pending.lock().insert(session_id.to_owned());
    }

    fn start(&self) {
        let mut task = self.task.lock();
        if task.is_some() {
            return;
        }
        let manager = self.manager.clone();
        let pending = self.pending.clone();
        *task = Some(PeriodicTask::spawn("snapshot-flush", self.interval, move || {
            let manager = manager.clone();
            let pending = pending.clone();
            async move {
                flush_pending(&manager, &pending).await;
            }
        }));
    }

    /// Stop the timer and push whatever is still pending.
    async fn stop(&self) {
        let task = self.task.lock().take();
        if let Some(task) = task {
            task.stop().await;
        }
        self.flush().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemorySessionStore;
    use sc_domain::config::ClusterConfig;

    #[tokio::test]
    async fn instant_pushes_immediately() {
        let store = Arc::new(InMemorySessionStore::new());
        let manager = ClusterManager::new(ClusterConfig::default(), store.clone());
        let session = manager.create_session().await;

        let snapshots = InstantSnapshotManager::new(manager.clone());
        snapshots.snapshot(&session.id()).await;
        assert!(store.contains(&session.id()));
    }

    #[tokio::test]
    async fn interval_defers_until_flush() {
        let store = Arc::new(InMemorySessionStore::new());
        let manager = ClusterManager::new(ClusterConfig::default(), store.clone());
        let session = manager.create_session().await;

        let snapshots = IntervalSnapshotManager::new(manager.clone(), Duration::from_secs(60));
        snapshots.snapshot(&session.id()).await;
        assert!(!store.contains(&session.id()));
        assert_eq!(snapshots.pending_count(), 1);

        assert_eq!(snapshots.flush().await, 1);
        assert!(store.contains(&session.id()));
        assert_eq!(snapshots.pending_count(), 0);
    }

    #[tokio::test]
    async fn interval_skips_sessions_gone_from_cache() {
        let store = Arc::new(InMemorySessionStore::new());
        let manager = ClusterManager::new(ClusterConfig::default(), store.clone());
        let session = manager.create_session().await;
        let id = session.id();

        let snapshots = IntervalSnapshotManager::new(manager.clone(), Duration::from_secs(60));
        snapshots.snapshot(&id).await;
        manager.remove_local(&id);

        assert_eq!(snapshots.flush().await, 0);
        assert!(!store.contains(&id));
    }

    #[tokio::test]
    async fn stop_flushes_pending() {
        let store = Arc::new(InMemorySessionStore::new());
        let manager = ClusterManager::new(ClusterConfig::default(), store.clone());
        let session = manager.create_session().await;

        let snapshots = IntervalSnapshotManager::new(manager.clone(), Duration::from_secs(60));
        snapshots.start();
        snapshots.snapshot(&session.id()).await;
        snapshots.stop().await;
        assert!(store.contains(&session.id()));
    }
}
