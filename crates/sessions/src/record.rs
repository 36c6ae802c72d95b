//! Serialized session form pushed to and pulled from the session store.

use std::collections::BTreeMap;

use chrono::serde::ts_milliseconds;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use sc_domain::error::Result;

/// Everything a remote node needs to adopt a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: String,
    #[serde(with = "ts_milliseconds")]
    pub creation_time: DateTime<Utc>,
    #[serde(with = "ts_milliseconds")]
    pub last_accessed_time: DateTime<Utc>,
    /// Seconds; negative means never expire.
    pub max_inactive_interval: i64,
    #[serde(default)]
    pub is_new: bool,
    #[serde(default = "d_true")]
    pub valid: bool,
    #[serde(default)]
    pub attributes: BTreeMap<String, StoredAttribute>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredAttribute {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    pub value: serde_json::Value,
}

impl SessionRecord {
    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Idle past its own timeout at `now`.  Never true for a negative
    /// timeout.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.max_inactive_interval >= 0 && self.idle_secs(now) >= self.max_inactive_interval
    }

    /// Whole seconds since the last access, as seen at `now`.
    pub fn idle_secs(&self, now: DateTime<Utc>) -> i64 {
        now.signed_duration_since(self.last_accessed_time)
            .num_seconds()
    }
}

fn d_true() -> bool {
    true
}
