//! Clustered session: attribute storage, dirty tracking and lifecycle.
//!
//! A session guards its own state with a per-session lock; the owning
//! [`ClusterManager`] is held as a weak handle so the manager's cache stays
//! the single owner of session lifetimes.  Listener callbacks always run
//! with the session lock released.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::de::DeserializeOwned;
use serde::Serialize;

use sc_domain::config::{InvalidationPolicy, ReplicationMode};
use sc_domain::error::{Error, Result};
use sc_domain::trace::TraceEvent;

use crate::attribute::AttributeValue;
use crate::listener::AttributeEvent;
use crate::manager::ClusterManager;
use crate::record::SessionRecord;

struct SessionState {
    creation_time: DateTime<Utc>,
    last_accessed_time: DateTime<Utc>,
    this_accessed_time: DateTime<Utc>,
    /// Seconds; negative means never expire.
    max_inactive_interval: i64,
    is_new: bool,
    valid: bool,
    attributes: HashMap<String, AttributeValue>,
    /// Bumped on every replicable change.  The session is dirty while
    /// `version > replicated_version`.
    version: u64,
    replicated_version: u64,
    last_replicated: Option<DateTime<Utc>>,
    replication_mode: Option<ReplicationMode>,
    /// Set by the first `set_replication_mode_for_request` of a request,
    /// cleared after the next store push.
    replication_mode_set: bool,
}

pub struct ClusteredSession {
    id: RwLock<String>,
    manager: Weak<ClusterManager>,
    policy: InvalidationPolicy,
    distributable: bool,
    state: Mutex<SessionState>,
    expiring: AtomicBool,
}

/// Expiry-relevant view used by the reaper.
#[derive(Debug, Clone, Copy)]
pub(crate) struct IdleInfo {
    pub max_inactive_interval: i64,
    pub this_accessed_time: DateTime<Utc>,
}

impl ClusteredSession {
    /// A brand-new session, dirty until its first push.
    pub(crate) fn new(id: String, manager: &Arc<ClusterManager>) -> Self {
        let cfg = manager.config();
        let now = Utc::now();
        Self {
            id: RwLock::new(id),
            manager: Arc::downgrade(manager),
            policy: cfg.invalidation_policy,
            distributable: cfg.distributable,
            state: Mutex::new(SessionState {
                creation_time: now,
                last_accessed_time: now,
                this_accessed_time: now,
                max_inactive_interval: cfg.max_inactive_interval_secs,
                is_new: true,
                valid: true,
                attributes: HashMap::new(),
                version: 1,
                replicated_version: 0,
                last_replicated: None,
                replication_mode: None,
                replication_mode_set: false,
            }),
            expiring: AtomicBool::new(false),
        }
    }

    /// Rebuild a session pulled from the store.  It starts clean: the store
    /// already holds exactly this state.
    pub(crate) fn from_record(record: SessionRecord, manager: &Arc<ClusterManager>) -> Self {
        let cfg = manager.config();
        let attributes = record
            .attributes
            .into_iter()
            .map(|(name, stored)| (name, AttributeValue::from(stored)))
            .collect();
        Self {
            id: RwLock::new(record.id),
            manager: Arc::downgrade(manager),
            policy: cfg.invalidation_policy,
            distributable: cfg.distributable,
            state: Mutex::new(SessionState {
                creation_time: record.creation_time,
                last_accessed_time: record.last_accessed_time,
                this_accessed_time: record.last_accessed_time,
                max_inactive_interval: record.max_inactive_interval,
                is_new: record.is_new,
                valid: record.valid,
                attributes,
                version: 0,
                replicated_version: 0,
                last_replicated: Some(Utc::now()),
                replication_mode: None,
                replication_mode_set: false,
            }),
            expiring: AtomicBool::new(false),
        }
    }

    // ── identity & metadata ───────────────────────────────────────────

    pub fn id(&self) -> String {
        self.id.read().clone()
    }

    /// Re-key the session.  Callers must re-register it under the new id.
    pub(crate) fn set_id(&self, id: String) {
        *self.id.write() = id;
        self.state.lock().version += 1;
    }

    pub fn is_valid(&self) -> bool {
        self.state.lock().valid
    }

    pub fn is_distributable(&self) -> bool {
        self.distributable
    }

    pub fn invalidation_policy(&self) -> InvalidationPolicy {
        self.policy
    }

    pub fn creation_time(&self) -> Result<DateTime<Utc>> {
        let state = self.state.lock();
        self.ensure_valid(&state, "creation_time")?;
        Ok(state.creation_time)
    }

    pub fn last_accessed_time(&self) -> Result<DateTime<Utc>> {
        let state = self.state.lock();
        self.ensure_valid(&state, "last_accessed_time")?;
        Ok(state.last_accessed_time)
    }

    pub fn this_accessed_time(&self) -> Result<DateTime<Utc>> {
        let state = self.state.lock();
        self.ensure_valid(&state, "this_accessed_time")?;
        Ok(state.this_accessed_time)
    }

    pub fn is_new(&self) -> Result<bool> {
        let state = self.state.lock();
        self.ensure_valid(&state, "is_new")?;
        Ok(state.is_new)
    }

    pub fn max_inactive_interval(&self) -> i64 {
        self.state.lock().max_inactive_interval
    }

    pub fn set_max_inactive_interval(&self, secs: i64) {
        let mut state = self.state.lock();
        if state.max_inactive_interval != secs {
            state.max_inactive_interval = secs;
            state.version += 1;
        }
    }

    /// Start of a request that uses this session.
    pub fn access(&self) {
        self.state.lock().this_accessed_time = Utc::now();
    }

    /// End of that request: the access becomes the last-accessed time.
    pub fn end_access(&self) {
        let mut state = self.state.lock();
        state.last_accessed_time = state.this_accessed_time;
        state.is_new = false;
    }

    // ── dirty tracking & replication mode ─────────────────────────────

    /// `true` when local state differs from the last pushed snapshot.
    pub fn is_modified(&self) -> bool {
        let state = self.state.lock();
        state.version > state.replicated_version
    }

    /// Force the dirty bit on (or clear it).
    pub fn set_modified(&self, modified: bool) {
        let mut state = self.state.lock();
        if modified {
            state.version += 1;
        } else {
            state.replicated_version = state.version;
        }
    }

    /// Per-session override of the manager's default replication mode.
    pub fn replication_mode(&self) -> Option<ReplicationMode> {
        self.state.lock().replication_mode
    }

    pub fn set_replication_mode(&self, mode: Option<ReplicationMode>) {
        self.state.lock().replication_mode = mode;
    }

    /// Set the override once per request: the first call wins until the
    /// session is next pushed.  Returns whether the mode was applied.
    pub fn set_replication_mode_for_request(&self, mode: ReplicationMode) -> bool {
        let mut state = self.state.lock();
        if state.replication_mode_set {
            return false;
        }
        state.replication_mode = Some(mode);
        state.replication_mode_set = true;
        true
    }

    pub(crate) fn needs_replication(&self, now: DateTime<Utc>, max_unreplicated_secs: u64) -> bool {
        let state = self.state.lock();
        if state.version > state.replicated_version {
            return true;
        }
        let max = i64::try_from(max_unreplicated_secs).unwrap_or(i64::MAX);
        match state.last_replicated {
            None => true,
            Some(at) => now.signed_duration_since(at).num_seconds() >= max,
        }
    }

    pub(crate) fn mark_replicated(&self, version: u64, now: DateTime<Utc>) {
        let mut state = self.state.lock();
        state.replicated_version = state.replicated_version.max(version);
        state.last_replicated = Some(now);
        state.replication_mode_set = false;
    }

    pub(crate) fn idle_info(&self) -> Option<IdleInfo> {
        let state = self.state.lock();
        state.valid.then_some(IdleInfo {
            max_inactive_interval: state.max_inactive_interval,
            this_accessed_time: state.this_accessed_time,
        })
    }

    // ── attributes ────────────────────────────────────────────────────

    /// Read an attribute.  Depending on the invalidation policy this may
    /// mark the session dirty, since the caller can mutate what it got.
    pub fn get_attribute(&self, name: &str) -> Result<Option<AttributeValue>> {
        let mut state = self.state.lock();
        self.ensure_valid(&state, "get_attribute")?;
        let value = state.attributes.get(name).cloned();
        let dirty = match self.policy {
            InvalidationPolicy::SetOnly => false,
            InvalidationPolicy::SetAndGet => true,
            InvalidationPolicy::SetAndNonPrimitiveGet => {
                value.as_ref().is_some_and(|v| !v.is_primitive())
            }
        };
        if dirty {
            state.version += 1;
        }
        Ok(value)
    }

    /// Read and deserialize an attribute.
    pub fn get_as<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>> {
        Ok(self
            .get_attribute(name)?
            .and_then(|v| v.to_typed()))
    }

    pub fn attribute_names(&self) -> Result<Vec<String>> {
        let state = self.state.lock();
        self.ensure_valid(&state, "attribute_names")?;
        let mut names: Vec<String> = state.attributes.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    /// Serialize `value` and bind it under `name`.
    pub fn set_attribute<T: Serialize + ?Sized>(&self, name: &str, value: &T) -> Result<()> {
        let json = serde_json::to_value(value).map_err(|_| Error::NotSerializable {
            name: name.to_owned(),
        })?;
        self.set_attribute_value(name, AttributeValue::json(json))
    }

    /// Bind a value tagged with a capability `kind`.
    pub fn set_typed_attribute<T: Serialize + ?Sized>(
        &self,
        name: &str,
        kind: &str,
        value: &T,
    ) -> Result<()> {
        let json = serde_json::to_value(value).map_err(|_| Error::NotSerializable {
            name: name.to_owned(),
        })?;
        self.set_attribute_value(name, AttributeValue::typed(kind, json))
    }

    /// Bind an in-process object.  Rejected on distributable sessions.
    pub fn set_local_attribute(&self, name: &str, value: Arc<dyn Any + Send + Sync>) -> Result<()> {
        self.set_attribute_value(name, AttributeValue::local(value))
    }

    /// Bind `value` under `name`, replacing any existing binding.  An
    /// untagged `null` removes the attribute instead.
    ///
    /// Notification order: `value_bound` on the new value, `value_unbound`
    /// on the replaced value, then attribute listeners.
    pub fn set_attribute_value(&self, name: &str, value: AttributeValue) -> Result<()> {
        {
            let state = self.state.lock();
            self.ensure_valid(&state, "set_attribute")?;
        }
        if value.is_null() {
            return self.remove_attribute(name);
        }
        if self.distributable && !value.is_serializable() {
            return Err(Error::NotSerializable {
                name: name.to_owned(),
            });
        }

        let old = {
            let mut state = self.state.lock();
            self.ensure_valid(&state, "set_attribute")?;
            state.version += 1;
            state.attributes.insert(name.to_owned(), value.clone())
        };

        let Some(manager) = self.manager.upgrade() else {
            return Ok(());
        };
        let listeners = manager.listeners();
        let id = self.id();
        listeners.fire_bound(&AttributeEvent {
            session_id: &id,
            name,
            value: &value,
        });
        match old {
            Some(old) => {
                let event = AttributeEvent {
                    session_id: &id,
                    name,
                    value: &old,
                };
                if old != value {
                    listeners.fire_unbound(&event);
                }
                listeners.fire_attribute_replaced(&event);
            }
            None => listeners.fire_attribute_added(&AttributeEvent {
                session_id: &id,
                name,
                value: &value,
            }),
        }
        Ok(())
    }

    pub fn remove_attribute(&self, name: &str) -> Result<()> {
        let removed = {
            let mut state = self.state.lock();
            self.ensure_valid(&state, "remove_attribute")?;
            let removed = state.attributes.remove(name);
            if removed.is_some() {
                state.version += 1;
            }
            removed
        };
        if let Some(old) = removed {
            self.notify_removed(name, &old);
        }
        Ok(())
    }

    fn notify_removed(&self, name: &str, old: &AttributeValue) {
        let Some(manager) = self.manager.upgrade() else {
            return;
        };
        let id = self.id();
        let event = AttributeEvent {
            session_id: &id,
            name,
            value: old,
        };
        manager.listeners().fire_unbound(&event);
        manager.listeners().fire_attribute_removed(&event);
    }

    // ── lifecycle ─────────────────────────────────────────────────────

    /// Application-initiated invalidation.  Fails on a session that is
    /// already invalid.
    pub fn invalidate(&self) -> Result<()> {
        {
            let state = self.state.lock();
            self.ensure_valid(&state, "invalidate")?;
        }
        self.expire();
        Ok(())
    }

    /// Expire the session: destroy notifications (reverse registration
    /// order), removal from the manager, then unbinding of every attribute.
    /// Re-entrant and repeated calls are no-ops.
    pub fn expire(&self) {
        if self.expiring.swap(true, Ordering::SeqCst) {
            return;
        }
        if !self.is_valid() {
            self.expiring.store(false, Ordering::SeqCst);
            return;
        }

        let manager = self.manager.upgrade();
        if let Some(m) = &manager {
            m.listeners().fire_session_destroyed(self);
            m.remove(self);
        }

        let drained: Vec<(String, AttributeValue)> = {
            let mut state = self.state.lock();
            state.valid = false;
            state.attributes.drain().collect()
        };
        for (name, value) in &drained {
            self.notify_removed(name, value);
        }

        self.expiring.store(false, Ordering::SeqCst);

        TraceEvent::SessionExpired {
            session_id: self.id(),
        }
        .emit();
    }

    /// Notify activation-capable attributes that the session is about to
    /// be serialized.
    pub fn passivate(&self) {
        self.for_each_capable(|manager, event| manager.listeners().fire_will_passivate(event));
    }

    /// Notify activation-capable attributes that the session was just
    /// deserialized.
    pub fn activate(&self) {
        self.for_each_capable(|manager, event| manager.listeners().fire_did_activate(event));
    }

    fn for_each_capable(&self, fire: impl Fn(&ClusterManager, &AttributeEvent<'_>)) {
        let Some(manager) = self.manager.upgrade() else {
            return;
        };
        let tagged: Vec<(String, AttributeValue)> = self
            .state
            .lock()
            .attributes
            .iter()
            .filter(|(_, v)| v.kind().is_some_and(|k| manager.listeners().has_activation(k)))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        let id = self.id();
        for (name, value) in &tagged {
            fire(
                &*manager,
                &AttributeEvent {
                    session_id: &id,
                    name,
                    value,
                },
            );
        }
    }

    // ── serialization ─────────────────────────────────────────────────

    /// Current state as a store record.  Local (non-serializable) values
    /// are left out.
    pub fn to_record(&self) -> SessionRecord {
        self.record_with_version().0
    }

    pub(crate) fn record_with_version(&self) -> (SessionRecord, u64) {
        let id = self.id();
        let state = self.state.lock();
        let attributes = state
            .attributes
            .iter()
            .filter_map(|(name, value)| value.to_stored().map(|s| (name.clone(), s)))
            .collect();
        let record = SessionRecord {
            id,
            creation_time: state.creation_time,
            last_accessed_time: state.last_accessed_time,
            max_inactive_interval: state.max_inactive_interval,
            is_new: state.is_new,
            valid: state.valid,
            attributes,
        };
        (record, state.version)
    }

    fn ensure_valid(&self, state: &SessionState, op: &str) -> Result<()> {
        if state.valid {
            Ok(())
        } else {
            Err(Error::InvalidState(format!(
                "{op}: session {} has been invalidated",
                self.id()
            )))
        }
    }
}

impl fmt::Debug for ClusteredSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClusteredSession")
            .field("id", &self.id())
            .field("policy", &self.policy)
            .field("distributable", &self.distributable)
            .finish_non_exhaustive()
    }
}
