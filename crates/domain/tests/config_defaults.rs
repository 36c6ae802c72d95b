use sc_domain::config::{
    Config, ConfigSeverity, InvalidationPolicy, ReplicationMode, SnapshotMode, StoreKind,
};

fn has_errors(config: &Config) -> bool {
    config
        .validate()
        .iter()
        .any(|e| e.severity == ConfigSeverity::Error)
}

#[test]
fn default_host_is_localhost() {
    let config = Config::default();
    assert_eq!(config.server.host, "127.0.0.1");
    assert_eq!(config.server.cookie_name, "SESSIONID");
}

#[test]
fn defaults_are_valid() {
    let config = Config::default();
    assert!(config.validate().is_empty());
    assert!(!has_errors(&config));
}

#[test]
fn cluster_section_parses() {
    let toml_str = r#"
[cluster]
invalidation_policy = "set_and_get"
replication_type = "async"
snapshot_mode = "interval"
snapshot_interval_ms = 250
route_tag = "node-b"
max_inactive_interval_secs = -1
"#;
    let config: Config = toml::from_str(toml_str).unwrap();
    assert_eq!(config.cluster.invalidation_policy, InvalidationPolicy::SetAndGet);
    assert_eq!(config.cluster.replication_type, ReplicationMode::Async);
    assert_eq!(config.cluster.snapshot_mode, SnapshotMode::Interval);
    assert_eq!(config.cluster.snapshot_interval_ms, 250);
    assert_eq!(config.cluster.route_tag.as_deref(), Some("node-b"));
    assert_eq!(config.cluster.max_inactive_interval_secs, -1);
    // Untouched fields keep their defaults.
    assert_eq!(config.cluster.reaper_check_interval_secs, 60);
    assert!(config.cluster.distributable);
}

#[test]
fn async_replication_is_only_a_warning() {
    let toml_str = r#"
[cluster]
replication_type = "async"
"#;
    let config: Config = toml::from_str(toml_str).unwrap();
    let issues = config.validate();
    assert_eq!(issues.len(), 1);
    assert_eq!(issues[0].severity, ConfigSeverity::Warning);
    assert!(!has_errors(&config));
}

#[test]
fn route_tag_with_dot_is_rejected() {
    let toml_str = r#"
[cluster]
route_tag = "node.a"
"#;
    let config: Config = toml::from_str(toml_str).unwrap();
    let issues = config.validate();
    assert!(issues
        .iter()
        .any(|e| e.field == "cluster.route_tag" && e.severity == ConfigSeverity::Error));
    assert!(has_errors(&config));
}

#[test]
fn zero_interval_rejected_only_in_interval_mode() {
    let mut config = Config::default();
    config.cluster.snapshot_interval_ms = 0;
    assert!(!has_errors(&config));

    config.cluster.snapshot_mode = SnapshotMode::Interval;
    assert!(has_errors(&config));
}

#[test]
fn file_store_parses() {
    let toml_str = r#"
[store]
kind = "file"
path = "/var/lib/sessiond"
"#;
    let config: Config = toml::from_str(toml_str).unwrap();
    assert_eq!(config.store.kind, StoreKind::File);
    assert_eq!(
        config.store.path.as_deref(),
        Some(std::path::Path::new("/var/lib/sessiond"))
    );
}
