//! Cluster manager: owns the local session cache and mediates between it
//! and the distributed [`SessionStore`].
//!
//! Per-session state machine:
//! `NOT_PRESENT → create → LOCAL_NEW → first push → LOCAL_AND_REMOTE → expire → REMOVED`.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;

use sc_domain::config::{ClusterConfig, ReplicationMode};
use sc_domain::error::Result;
use sc_domain::trace::TraceEvent;

use crate::listener::ListenerRegistry;
use crate::record::SessionRecord;
use crate::route;
use crate::session::ClusteredSession;
use crate::store::SessionStore;
use crate::valve::RequestContext;

pub struct ClusterManager {
    config: ClusterConfig,
    store: Arc<dyn SessionStore>,
    /// Local cache.  Every structural change (add, remove, reaper scan)
    /// holds this lock; per-session state has its own lock.
    sessions: Mutex<HashMap<String, Arc<ClusteredSession>>>,
    listeners: ListenerRegistry,
}

impl ClusterManager {
    pub fn new(config: ClusterConfig, store: Arc<dyn SessionStore>) -> Arc<Self> {
        tracing::info!(
            route = config.route_tag.as_deref().unwrap_or("-"),
            replication = %config.replication_type,
            policy = ?config.invalidation_policy,
            "cluster manager created"
        );
        Arc::new(Self {
            config,
            store,
            sessions: Mutex::new(HashMap::new()),
            listeners: ListenerRegistry::new(),
        })
    }

    pub fn config(&self) -> &ClusterConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    pub fn listeners(&self) -> &ListenerRegistry {
        &self.listeners
    }

    pub fn route_tag(&self) -> Option<&str> {
        self.config.route_tag.as_deref()
    }

    pub fn default_replication_mode(&self) -> ReplicationMode {
        self.config.replication_type
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Local cache
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    pub fn find_local(&self, id: &str) -> Option<Arc<ClusteredSession>> {
        self.sessions.lock().get(id).cloned()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.lock().len()
    }

    /// Copy of every cached session, taken under the cache lock.
    pub fn sessions(&self) -> Vec<Arc<ClusteredSession>> {
        self.sessions.lock().values().cloned().collect()
    }

    /// Register a session under its current id.  If another request won
    /// the race and already cached that id, the cached session is returned.
    pub fn add(&self, session: Arc<ClusteredSession>) -> Arc<ClusteredSession> {
        let id = session.id();
        self.sessions
            .lock()
            .entry(id)
            .or_insert(session)
            .clone()
    }

    /// Drop the local cache entry only.  The store copy is untouched.
    pub fn remove_local(&self, id: &str) -> Option<Arc<ClusteredSession>> {
        self.sessions.lock().remove(id)
    }

    /// Remove a session from the local cache now and from the store in the
    /// background.  Removal is off the hot path and never waits for the
    /// store.
    pub fn remove(&self, session: &ClusteredSession) {
        let id = session.id();
        self.remove_local(&id);
        self.remove_remote_async(id);
    }

    fn remove_remote_async(&self, id: String) {
        let store = self.store.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = store.remove(&id).await {
                        tracing::warn!(session_id = %id, error = %e, "store removal failed, skipped");
                    }
                });
            }
            Err(_) => {
                tracing::warn!(session_id = %id, "no async runtime, store removal skipped");
            }
        }
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Creation & lookup
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// Create a session with a fresh store-minted id plus this node's route
    /// tag.  It is cached locally and reaches the store on its first
    /// snapshot.
    pub async fn create_session(self: &Arc<Self>) -> Arc<ClusteredSession> {
        let id = route::with_route(&self.store.new_id(), self.route_tag());
        let session = self.add(Arc::new(ClusteredSession::new(id.clone(), self)));

        self.listeners.fire_session_created(&session);
        TraceEvent::SessionCreated { session_id: id }.emit();
        session
    }

    /// Resolve a client-supplied session id.
    ///
    /// 1. Local cache by exact id.
    /// 2. Local cache by route-adjusted id (cookie rewritten on hit).
    /// 3. Store, trying the requested, route-adjusted and bare ids in order.
    /// 4. A store hit is activated and cached.  On a node with a route tag,
    ///    an id that does not carry it is re-keyed, re-pushed and the cookie
    ///    rewritten.
    /// 5. Otherwise not found.
    pub async fn find_session(
        self: &Arc<Self>,
        id: &str,
        ctx: Option<&RequestContext>,
    ) -> Option<Arc<ClusteredSession>> {
        if let Some(session) = self.find_local(id) {
            return Some(session);
        }

        let adjusted = route::route_adjusted(id, self.route_tag());
        if adjusted != id {
            if let Some(session) = self.find_local(&adjusted) {
                tracing::debug!(requested = %id, adjusted = %adjusted, "session found under local route");
                if let Some(ctx) = ctx {
                    ctx.set_session_cookie(&adjusted);
                }
                return Some(session);
            }
        }

        for key in route::lookup_keys(id, self.route_tag()) {
            let Some(record) = self.load_remote(&key).await else {
                continue;
            };
            if !record.valid {
                continue;
            }
            // Nobody reaps the store copy of a session whose node is gone.
            if record.is_expired(Utc::now()) {
                tracing::debug!(session_id = %key, "expired store copy discarded");
                self.remove_remote_async(key);
                continue;
            }
            return Some(self.adopt(key, record, id, &adjusted, ctx).await);
        }

        tracing::debug!(session_id = %id, "session not found locally or in store");
        None
    }

    async fn adopt(
        self: &Arc<Self>,
        store_key: String,
        record: SessionRecord,
        requested: &str,
        adjusted: &str,
        ctx: Option<&RequestContext>,
    ) -> Arc<ClusteredSession> {
        let attributes = record.attributes.len();
        let session = Arc::new(ClusteredSession::from_record(record, self));
        // Failover: take the session over under this node's route.
        let rekey = self.route_tag().is_some() && session.id() != adjusted;
        if rekey {
            session.set_id(adjusted.to_owned());
        }

        let cached = self.add(session.clone());
        if !Arc::ptr_eq(&cached, &session) {
            // A concurrent request adopted it first; its copy is the live one.
            let id = cached.id();
            if id != requested {
                if let Some(ctx) = ctx {
                    ctx.set_session_cookie(&id);
                }
            }
            return cached;
        }

        session.activate();
        TraceEvent::SessionLoaded {
            session_id: store_key.clone(),
            attributes,
        }
        .emit();

        if !rekey {
            let id = session.id();
            if id != requested {
                if let Some(ctx) = ctx {
                    ctx.set_session_cookie(&id);
                }
            }
            return session;
        }

        if let Err(e) = self.store_session(&session).await {
            tracing::warn!(session_id = %adjusted, error = %e, "failed to push re-keyed session");
        }
        if store_key != adjusted {
            self.remove_remote_async(store_key);
        }
        if let Some(ctx) = ctx {
            ctx.set_session_cookie(adjusted);
        }

        TraceEvent::SessionFailover {
            requested_id: requested.to_owned(),
            new_id: adjusted.to_owned(),
        }
        .emit();
        session
    }

    /// Fetch and decode a record from the store.  Store or decode failures
    /// count as "not present".
    pub async fn load_remote(&self, id: &str) -> Option<SessionRecord> {
        match self.store.get(id).await {
            Ok(Some(blob)) => match SessionRecord::decode(&blob) {
                Ok(record) => Some(record),
                Err(e) => {
                    tracing::warn!(session_id = %id, error = %e, "undecodable session blob ignored");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(session_id = %id, error = %e, "session store lookup failed");
                None
            }
        }
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Replication
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// Push a session to the store if it is dirty, was never pushed, or its
    /// last push is older than `max_unreplicated_interval_secs`.  Returns
    /// whether a push happened.
    pub async fn store_session(&self, session: &ClusteredSession) -> Result<bool> {
        let now = Utc::now();
        if !session.is_valid()
            || !session.needs_replication(now, self.config.max_unreplicated_interval_secs)
        {
            return Ok(false);
        }

        session.passivate();
        let (record, version) = session.record_with_version();
        let blob = record.encode()?;
        let bytes = blob.len();
        let mode = session
            .replication_mode()
            .unwrap_or(self.config.replication_type);

        self.store.put(&record.id, blob, mode).await?;
        session.mark_replicated(version, now);

        TraceEvent::SessionReplicated {
            session_id: record.id,
            mode: mode.to_string(),
            bytes,
        }
        .emit();
        Ok(true)
    }
}
