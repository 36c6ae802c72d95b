//! Request interceptor.
//!
//! Each request carries an explicit [`RequestContext`] instead of ambient
//! per-thread state: session lookups that need to rewrite the client's
//! session cookie (failover) write to the context, and the HTTP layer turns
//! that into a `Set-Cookie` header.  After the handler returns,
//! [`SessionValve::invoke`] snapshots the request's session.

use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::manager::ClusterManager;
use crate::session::ClusteredSession;
use crate::snapshot::SnapshotManager;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Request context
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Default)]
pub struct RequestContext {
    requested_session_id: Option<String>,
    session: Mutex<Option<Arc<ClusteredSession>>>,
    cookie: Mutex<Option<String>>,
}

impl RequestContext {
    /// Context for a request that presented `requested_session_id` (from a
    /// cookie or URL token), if any.
    pub fn new(requested_session_id: Option<String>) -> Self {
        Self {
            requested_session_id,
            ..Default::default()
        }
    }

    pub fn requested_session_id(&self) -> Option<&str> {
        self.requested_session_id.as_deref()
    }

    /// The session associated with this request, resolving the requested id
    /// through the manager on first use.  With `create`, a missing or
    /// unknown session is replaced by a new one and its id is queued as the
    /// response cookie.
    pub async fn session(
        &self,
        manager: &Arc<ClusterManager>,
        create: bool,
    ) -> Option<Arc<ClusteredSession>> {
        let current = self.session.lock().clone();
        if let Some(session) = current {
            if session.is_valid() {
                return Some(session);
            }
        }

        let mut found = None;
        if let Some(id) = self.requested_session_id() {
            found = manager.find_session(id, Some(self)).await;
        }
        let session = match found {
            Some(session) if session.is_valid() => session,
            _ if create => {
                let session = manager.create_session().await;
                self.set_session_cookie(&session.id());
                session
            }
            _ => return None,
        };

        session.access();
        *self.session.lock() = Some(session.clone());
        Some(session)
    }

    /// The session this request has touched so far, without any lookup.
    pub fn current_session(&self) -> Option<Arc<ClusteredSession>> {
        self.session.lock().clone()
    }

    /// Queue a session cookie for the response.
    pub fn set_session_cookie(&self, id: &str) {
        *self.cookie.lock() = Some(id.to_owned());
    }

    pub fn session_cookie(&self) -> Option<String> {
        self.cookie.lock().clone()
    }

    fn release_session(&self) -> Option<Arc<ClusteredSession>> {
        self.session.lock().take()
    }
}

/// Drops the context's session reference on every exit path, including
/// unwinding out of the handler.
struct ReleaseOnDrop<'a>(&'a RequestContext);

impl Drop for ReleaseOnDrop<'_> {
    fn drop(&mut self) {
        self.0.release_session();
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Valve
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct SessionValve {
    snapshots: Arc<dyn SnapshotManager>,
}

impl SessionValve {
    pub fn new(snapshots: Arc<dyn SnapshotManager>) -> Self {
        Self { snapshots }
    }

    pub fn snapshots(&self) -> &Arc<dyn SnapshotManager> {
        &self.snapshots
    }

    /// Run `next` (the rest of the request pipeline) with `ctx`, then close
    /// out the session access and hand it to the snapshot manager.
    pub async fn invoke<F, Fut, T>(&self, ctx: Arc<RequestContext>, next: F) -> T
    where
        F: FnOnce(Arc<RequestContext>) -> Fut,
        Fut: Future<Output = T>,
    {
        let guard = ReleaseOnDrop(&ctx);
        let output = next(ctx.clone()).await;

        if let Some(session) = ctx.current_session() {
            if session.is_valid() {
                session.end_access();
                self.snapshots.snapshot(&session.id()).await;
            }
        }
        drop(guard);
        output
    }
}
