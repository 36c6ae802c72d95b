mod common;

use std::sync::Arc;
use std::time::Duration;

use sc_domain::config::{ClusterConfig, ReplicationMode, SnapshotMode};
use sc_sessions::{
    snapshot_manager_for, ClusterManager, IntervalSnapshotManager, RequestContext, SessionValve,
    SnapshotManager,
};

use common::{node, RecordingStore};

#[tokio::test]
async fn two_requests_in_one_interval_push_once() {
    let store = RecordingStore::new();
    let manager = node(Some("A"), store.clone());
    let snapshots = Arc::new(IntervalSnapshotManager::new(
        manager.clone(),
        Duration::from_secs(3600),
    ));
    let valve = SessionValve::new(snapshots.clone());

    let ctx = Arc::new(RequestContext::new(None));
    let id = valve
        .invoke(ctx.clone(), |ctx| {
            let manager = manager.clone();
            async move {
                let session = ctx.session(&manager, true).await.unwrap();
                session.set_attribute("step", &1).unwrap();
                session.id()
            }
        })
        .await;

    let ctx = Arc::new(RequestContext::new(Some(id.clone())));
    valve
        .invoke(ctx, |ctx| {
            let manager = manager.clone();
            async move {
                let session = ctx.session(&manager, false).await.unwrap();
                session.set_attribute("step", &2).unwrap();
            }
        })
        .await;

    assert_eq!(store.put_count(&id), 0);
    assert_eq!(snapshots.pending_count(), 1);

    assert_eq!(snapshots.flush().await, 1);
    assert_eq!(store.put_count(&id), 1);

    let record = manager.load_remote(&id).await.unwrap();
    assert_eq!(record.attributes["step"].value, serde_json::json!(2));
    assert!(!record.is_new);
}

#[tokio::test]
async fn timer_flushes_without_explicit_call() {
    let store = RecordingStore::new();
    let config = ClusterConfig {
        snapshot_mode: SnapshotMode::Interval,
        snapshot_interval_ms: 10,
        ..Default::default()
    };
    let manager = ClusterManager::new(config, store.clone());
    let snapshots = snapshot_manager_for(manager.clone());
    snapshots.start();

    let session = manager.create_session().await;
    snapshots.snapshot(&session.id()).await;

    assert!(common::eventually(|| store.put_count(&session.id()) == 1).await);
    snapshots.stop().await;
}

#[tokio::test]
async fn request_override_controls_push_mode() {
    let store = RecordingStore::new();
    let manager = node(None, store.clone());
    let snapshots = snapshot_manager_for(manager.clone());

    let session = manager.create_session().await;
    assert!(session.set_replication_mode_for_request(ReplicationMode::Async));
    assert!(!session.set_replication_mode_for_request(ReplicationMode::Sync));
    snapshots.snapshot(&session.id()).await;

    let puts = store.puts.lock().clone();
    assert_eq!(puts, vec![(session.id(), ReplicationMode::Async)]);

    // The next request may choose again.
    assert!(session.set_replication_mode_for_request(ReplicationMode::Sync));
}
