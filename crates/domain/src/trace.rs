use serde::Serialize;

/// Structured trace events emitted across the session-cluster crates.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum TraceEvent {
    SessionCreated {
        session_id: String,
    },
    SessionLoaded {
        session_id: String,
        attributes: usize,
    },
    SessionReplicated {
        session_id: String,
        mode: String,
        bytes: usize,
    },
    SessionFailover {
        requested_id: String,
        new_id: String,
    },
    SessionExpired {
        session_id: String,
    },
    SessionEvicted {
        session_id: String,
        remote_idle_secs: i64,
    },
    SnapshotFlushed {
        pending: usize,
        pushed: usize,
    },
    ReaperPass {
        expired: usize,
        evicted: usize,
        duration_ms: u64,
    },
}

impl TraceEvent {
    pub fn emit(&self) {
        let json = serde_json::to_string(self).unwrap_or_default();
        tracing::info!(trace_event = %json, "sc_event");
    }
}
