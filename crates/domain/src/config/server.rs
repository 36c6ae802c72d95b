use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Server
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "d_8080")]
    pub port: u16,
    #[serde(default = "d_host")]
    pub host: String,
    /// Name of the cookie carrying the session id.
    #[serde(default = "d_cookie_name")]
    pub cookie_name: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            host: "127.0.0.1".into(),
            cookie_name: d_cookie_name(),
        }
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_8080() -> u16 {
    8080
}
fn d_host() -> String {
    "127.0.0.1".into()
}
fn d_cookie_name() -> String {
    "SESSIONID".into()
}
