use std::sync::Arc;

use sc_domain::config::Config;
use sc_sessions::{ClusterManager, SessionReaper, SessionValve};

/// Shared application state passed to all API handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    /// Local session cache plus the distributed store behind it.
    pub manager: Arc<ClusterManager>,
    /// Post-request snapshot hook; owns the snapshot strategy.
    pub valve: Arc<SessionValve>,
    pub reaper: Arc<SessionReaper>,
}
