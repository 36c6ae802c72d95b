//! AppState construction and background-task lifecycle extracted from
//! `main.rs`.

use std::sync::Arc;

use anyhow::Context;

use sc_domain::config::{Config, ConfigSeverity, StoreConfig, StoreKind};
use sc_sessions::{
    snapshot_manager_for, ClusterManager, FileSessionStore, InMemorySessionStore, SessionReaper,
    SessionStore, SessionValve,
};

use crate::state::AppState;

/// Validate config and wire the store, cluster manager, snapshot strategy
/// and reaper into an [`AppState`].  Background loops are not started.
pub fn build_app_state(config: Arc<Config>) -> anyhow::Result<AppState> {
    // ── Config validation ────────────────────────────────────────────
    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => tracing::warn!("config: {issue}"),
            ConfigSeverity::Error => tracing::error!("config: {issue}"),
        }
    }
    if issues.iter().any(|i| i.severity == ConfigSeverity::Error) {
        anyhow::bail!(
            "config validation failed with {} error(s)",
            issues
                .iter()
                .filter(|i| i.severity == ConfigSeverity::Error)
                .count()
        );
    }

    // ── Session store ────────────────────────────────────────────────
    let store = build_store(&config.store).context("initializing session store")?;

    // ── Cluster manager ──────────────────────────────────────────────
    let manager = ClusterManager::new(config.cluster.clone(), store);
    if !config.cluster.distributable {
        tracing::info!("sessions are not distributable, attribute values are not checked");
    }

    // ── Snapshot strategy + valve ────────────────────────────────────
    let snapshots = snapshot_manager_for(manager.clone());
    let valve = Arc::new(SessionValve::new(snapshots));
    tracing::info!(
        mode = ?config.cluster.snapshot_mode,
        interval_ms = config.cluster.snapshot_interval_ms,
        "snapshot manager ready"
    );

    // ── Reaper ───────────────────────────────────────────────────────
    let reaper = Arc::new(SessionReaper::from_config(manager.clone()));

    Ok(AppState {
        config,
        manager,
        valve,
        reaper,
    })
}

/// Open the distributed store selected by `[store]`.
pub fn build_store(config: &StoreConfig) -> anyhow::Result<Arc<dyn SessionStore>> {
    match config.kind {
        StoreKind::Memory => {
            tracing::info!("using in-memory session store (single node only)");
            Ok(Arc::new(InMemorySessionStore::new()))
        }
        StoreKind::File => {
            let path = config
                .path
                .as_deref()
                .context("store.path is required for kind = \"file\"")?;
            let store = FileSessionStore::new(path)
                .with_context(|| format!("opening session directory {}", path.display()))?;
            tracing::info!(path = %path.display(), "file session store ready");
            Ok(Arc::new(store))
        }
    }
}

/// Start the snapshot timer (interval mode) and the reaper.
pub fn spawn_background_tasks(state: &AppState) {
    state.valve.snapshots().start();
    state.reaper.start();
    tracing::info!(
        check_interval_secs = state.config.cluster.reaper_check_interval_secs,
        "session reaper started"
    );
}

/// Stop background loops.  Pending interval snapshots are flushed.
pub async fn stop_background_tasks(state: &AppState) {
    state.reaper.stop().await;
    state.valve.snapshots().stop().await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn builds_with_defaults() {
        let state = build_app_state(Arc::new(Config::default())).unwrap();
        assert_eq!(state.manager.session_count(), 0);
        assert!(state.manager.route_tag().is_none());
    }

    #[tokio::test]
    async fn invalid_config_is_rejected() {
        let mut config = Config::default();
        config.server.port = 0;
        let err = build_app_state(Arc::new(config)).err().unwrap();
        assert!(err.to_string().contains("1 error(s)"), "{err}");
    }

    #[tokio::test]
    async fn file_store_is_created_on_demand() {
        let dir = tempfile::tempdir().unwrap();
        let config = StoreConfig {
            kind: StoreKind::File,
            path: Some(dir.path().join("sessions")),
        };
        let store = build_store(&config).unwrap();
        assert!(store.get("missing").await.unwrap().is_none());
        assert!(dir.path().join("sessions").is_dir());
    }

    #[tokio::test]
    async fn background_tasks_start_and_stop() {
        let state = build_app_state(Arc::new(Config::default())).unwrap();
        spawn_background_tasks(&state);
        stop_background_tasks(&state).await;
    }
}
