//! Session cleanup reaper.
//!
//! A session that looks idle locally may still be in use on another node.
//! Before expiring it, the reaper re-reads the store copy: if that shows
//! recent activity only the local cache entry is dropped; the session is
//! expired only when the remote copy is idle too (or unavailable).

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use parking_lot::Mutex;

use sc_domain::config::ReplicationMode;
use sc_domain::trace::TraceEvent;

use crate::manager::ClusterManager;
use crate::worker::PeriodicTask;

/// Outcome of one reaper pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReapReport {
    /// Idle everywhere: expired and removed from the store.
    pub expired: usize,
    /// Idle here but active elsewhere: dropped from the local cache only.
    pub evicted: usize,
    /// Never expire (`max_inactive_interval < 0`).
    pub skipped: usize,
}

pub struct SessionReaper {
    manager: Arc<ClusterManager>,
    check_interval: Duration,
    task: Mutex<Option<PeriodicTask>>,
}

impl SessionReaper {
    pub fn new(manager: Arc<ClusterManager>, check_interval: Duration) -> Self {
        Self {
            manager,
            check_interval,
            task: Mutex::new(None),
        }
    }

    /// Reaper using `reaper_check_interval_secs` from the manager's config.
    pub fn from_config(manager: Arc<ClusterManager>) -> Self {
        let secs = manager.config().reaper_check_interval_secs;
        Self::new(manager, Duration::from_secs(secs))
    }

    pub fn start(&self) {
        let mut task = self.task.lock();
        if task.is_some() {
            return;
        }
        let manager = self.manager.clone();
        *task = Some(PeriodicTask::spawn("session-reaper", self.check_interval, move || {
            let manager = manager.clone();
            async move {
                reap(&manager).await;
            }
        }));
    }

    pub async fn stop(&self) {
        let task = self.task.lock().take();
        if let Some(task) = task {
            task.stop().await;
        }
    }

    /// Run a single pass now.
    pub async fn reap_once(&self) -> ReapReport {
        reap(&self.manager).await
    }
}

async fn reap(manager: &ClusterManager) -> ReapReport {
    let started = Instant::now();
    let mut report = ReapReport::default();

    for session in manager.sessions() {
        let Some(info) = session.idle_info() else {
            continue;
        };
        if info.max_inactive_interval < 0 {
            report.skipped += 1;
            continue;
        }

        let now = Utc::now();
        let local_idle = now
            .signed_duration_since(info.this_accessed_time)
            .num_seconds();
        if local_idle < info.max_inactive_interval {
            continue;
        }

        let id = session.id();
        match manager.load_remote(&id).await {
            Some(remote) if remote.idle_secs(now) < info.max_inactive_interval => {
                manager.remove_local(&id);
                report.evicted += 1;
                TraceEvent::SessionEvicted {
                    session_id: id,
                    remote_idle_secs: remote.idle_secs(now),
                }
                .emit();
            }
            _ => {
                tracing::debug!(session_id = %id, local_idle, "expiring idle session");
                // Don't block the reaper on the store for a dead session.
                let prior = session.replication_mode();
                session.set_replication_mode(Some(ReplicationMode::Async));
                session.expire();
                session.set_replication_mode(prior);
                report.expired += 1;
            }
        }
    }

    if report.expired > 0 || report.evicted > 0 {
        TraceEvent::ReaperPass {
            expired: report.expired,
            evicted: report.evicted,
            duration_ms: started.elapsed().as_millis() as u64,
        }
        .emit();
    }
    report
}
