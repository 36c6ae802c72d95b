use sc_domain::config::{Config, ConfigSeverity};

/// Parse and validate the config, printing any issues.
///
/// Returns `false` when errors were found; the caller exits with code 1.
pub fn validate(config: &Config, config_path: &str) -> bool {
    let issues = config.validate();

    if issues.is_empty() {
        println!("Config OK ({config_path})");
        return true;
    }

    let error_count = issues
        .iter()
        .filter(|e| e.severity == ConfigSeverity::Error)
        .count();
    let warning_count = issues.len() - error_count;

    for issue in &issues {
        println!("{issue}");
    }

    println!("\n{error_count} error(s), {warning_count} warning(s) in {config_path}");

    error_count == 0
}

/// Dump the resolved config (with all defaults filled in) as TOML.
pub fn show(config: &Config) -> anyhow::Result<()> {
    let output = toml::to_string_pretty(config)?;
    print!("{output}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sc_domain::config::ReplicationMode;

    #[test]
    fn warnings_alone_pass() {
        let mut config = Config::default();
        config.cluster.replication_type = ReplicationMode::Async;
        assert!(validate(&config, "test.toml"));
    }

    #[test]
    fn errors_fail() {
        let mut config = Config::default();
        config.server.cookie_name.clear();
        assert!(!validate(&config, "test.toml"));
    }

    #[test]
    fn shown_config_parses_back() {
        let config = Config::default();
        let text = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&text).unwrap();
        assert_eq!(parsed.server.cookie_name, config.server.cookie_name);
        assert_eq!(parsed.cluster.snapshot_mode, config.cluster.snapshot_mode);
    }
}
