use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Cluster session management
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Clustered session configuration: controls dirty tracking, replication
/// and expiry for every session owned by this node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Which attribute accesses mark a session as needing replication.
    #[serde(default)]
    pub invalidation_policy: InvalidationPolicy,

    /// Default replication mode for snapshot pushes.
    #[serde(default)]
    pub replication_type: ReplicationMode,

    /// When a dirtied session is pushed to the store.
    #[serde(default)]
    pub snapshot_mode: SnapshotMode,

    /// Flush period for `snapshot_mode = "interval"`.
    #[serde(default = "d_1000")]
    pub snapshot_interval_ms: u64,

    /// How often the reaper scans the local cache.
    #[serde(default = "d_60")]
    pub reaper_check_interval_secs: u64,

    /// Per-node route tag appended to session ids (`<id>.<route>`).
    /// `None` disables routing suffixes.
    #[serde(default)]
    pub route_tag: Option<String>,

    /// Idle timeout applied to new sessions.  Negative means never expire.
    #[serde(default = "d_1800")]
    pub max_inactive_interval_secs: i64,

    /// A clean session is still pushed once its last push is older than
    /// this, so other nodes see a fresh last-accessed time.
    #[serde(default = "d_60")]
    pub max_unreplicated_interval_secs: u64,

    /// Distributable sessions reject attribute values that cannot be
    /// serialized.
    #[serde(default = "d_true")]
    pub distributable: bool,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            invalidation_policy: InvalidationPolicy::default(),
            replication_type: ReplicationMode::default(),
            snapshot_mode: SnapshotMode::default(),
            snapshot_interval_ms: d_1000(),
            reaper_check_interval_secs: d_60(),
            route_tag: None,
            max_inactive_interval_secs: d_1800(),
            max_unreplicated_interval_secs: d_60(),
            distributable: true,
        }
    }
}

/// Dirty-tracking policy for attribute access.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvalidationPolicy {
    /// Only `set_attribute` / `remove_attribute` mark the session dirty.
    SetOnly,
    /// Every `get_attribute` also marks the session dirty.
    SetAndGet,
    /// `get_attribute` marks dirty unless the value is a string, number,
    /// boolean or null.
    #[default]
    SetAndNonPrimitiveGet,
}

/// Propagation semantics for a store push.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplicationMode {
    /// Block until the store acknowledges the push.
    #[default]
    Sync,
    /// Fire-and-forget.
    Async,
}

impl std::fmt::Display for ReplicationMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sync => f.write_str("sync"),
            Self::Async => f.write_str("async"),
        }
    }
}

/// Snapshot strategy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotMode {
    /// Push right after every request that touched the session.
    #[default]
    Instant,
    /// Batch pushes on a fixed timer.
    Interval,
}

// ── serde default helpers ───────────────────────────────────────────

fn d_1000() -> u64 {
    1000
}
fn d_60() -> u64 {
    60
}
fn d_1800() -> i64 {
    1800
}
fn d_true() -> bool {
    true
}
