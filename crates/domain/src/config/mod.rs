mod cluster;
mod observability;
mod server;
mod store;

pub use cluster::*;
pub use observability::*;
pub use server::*;
pub use store::*;

use serde::{Deserialize, Serialize};
use std::fmt;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub cluster: ClusterConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Config validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Severity level for a configuration issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

/// A single configuration validation issue.
#[derive(Debug, Clone)]
pub struct ConfigError {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}

impl Config {
    /// Validate the configuration and return a list of issues.
    ///
    /// Returns an empty vec when everything looks good.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();
        let mut error = |field: &str, message: &str| {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: field.into(),
                message: message.into(),
            });
        };

        if self.server.port == 0 {
            error("server.port", "port must be greater than 0");
        }
        if self.server.host.is_empty() {
            error("server.host", "host must not be empty");
        }
        if self.server.cookie_name.is_empty() {
            error("server.cookie_name", "cookie name must not be empty");
        }

        // The route tag is appended after a '.', so it must not contain one.
        if let Some(route) = &self.cluster.route_tag {
            if route.is_empty() {
                error("cluster.route_tag", "route tag must not be empty (omit it instead)");
            } else if route.contains('.') {
                error("cluster.route_tag", "route tag must not contain '.'");
            }
        }

        if self.cluster.snapshot_mode == SnapshotMode::Interval
            && self.cluster.snapshot_interval_ms == 0
        {
            error(
                "cluster.snapshot_interval_ms",
                "interval snapshots need a non-zero interval",
            );
        }
        if self.cluster.reaper_check_interval_secs == 0 {
            error(
                "cluster.reaper_check_interval_secs",
                "reaper interval must be greater than 0",
            );
        }

        if self.store.kind == StoreKind::File && self.store.path.is_none() {
            error("store.path", "file store requires a path");
        }

        if self.cluster.replication_type == ReplicationMode::Async {
            errors.push(ConfigError {
                severity: ConfigSeverity::Warning,
                field: "cluster.replication_type".into(),
                message: "async replication may lose the last update on node failure".into(),
            });
        }

        errors
    }
}
