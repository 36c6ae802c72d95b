//! Session, attribute and capability listeners.
//!
//! Every callback returns a [`ListenerResult`].  Failures and panics are
//! logged and swallowed so a faulty listener cannot break the session
//! lifecycle for other users.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::attribute::AttributeValue;
use crate::session::ClusteredSession;

pub type ListenerError = Box<dyn std::error::Error + Send + Sync>;
pub type ListenerResult = std::result::Result<(), ListenerError>;

/// An attribute change or binding notification.
#[derive(Debug, Clone, Copy)]
pub struct AttributeEvent<'a> {
    pub session_id: &'a str,
    pub name: &'a str,
    /// The new value for add/bound events; the previous value for
    /// replace/remove/unbound events.
    pub value: &'a AttributeValue,
}

/// Session creation and destruction.
pub trait SessionListener: Send + Sync {
    fn session_created(&self, _session: &ClusteredSession) -> ListenerResult {
        Ok(())
    }

    /// Called while the session is still valid, before its attributes are
    /// unbound.
    fn session_destroyed(&self, _session: &ClusteredSession) -> ListenerResult {
        Ok(())
    }
}

/// Attribute changes on any session.
pub trait AttributeListener: Send + Sync {
    fn attribute_added(&self, _event: &AttributeEvent<'_>) -> ListenerResult {
        Ok(())
    }

    fn attribute_replaced(&self, _event: &AttributeEvent<'_>) -> ListenerResult {
        Ok(())
    }

    fn attribute_removed(&self, _event: &AttributeEvent<'_>) -> ListenerResult {
        Ok(())
    }
}

/// Capability handler for values that want to know when they are bound to
/// or unbound from a session.  Registered per attribute kind.
pub trait BindingListener: Send + Sync {
    fn value_bound(&self, _event: &AttributeEvent<'_>) -> ListenerResult {
        Ok(())
    }

    fn value_unbound(&self, _event: &AttributeEvent<'_>) -> ListenerResult {
        Ok(())
    }
}

/// Capability handler for values that care about replication: called
/// before the session is serialized and after it is deserialized.
pub trait ActivationListener: Send + Sync {
    fn will_passivate(&self, _event: &AttributeEvent<'_>) -> ListenerResult {
        Ok(())
    }

    fn did_activate(&self, _event: &AttributeEvent<'_>) -> ListenerResult {
        Ok(())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Registry
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Listener tables owned by a cluster manager.  Capability handlers are
/// looked up by the attribute's `kind` tag.
#[derive(Default)]
pub struct ListenerRegistry {
    session: RwLock<Vec<Arc<dyn SessionListener>>>,
    attribute: RwLock<Vec<Arc<dyn AttributeListener>>>,
    binding: RwLock<HashMap<String, Arc<dyn BindingListener>>>,
    activation: RwLock<HashMap<String, Arc<dyn ActivationListener>>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_session_listener(&self, listener: Arc<dyn SessionListener>) {
        self.session.write().push(listener);
    }

    pub fn add_attribute_listener(&self, listener: Arc<dyn AttributeListener>) {
        self.attribute.write().push(listener);
    }

    pub fn register_binding(&self, kind: impl Into<String>, handler: Arc<dyn BindingListener>) {
        self.binding.write().insert(kind.into(), handler);
    }

    pub fn register_activation(
        &self,
        kind: impl Into<String>,
        handler: Arc<dyn ActivationListener>,
    ) {
        self.activation.write().insert(kind.into(), handler);
    }

    pub fn has_activation(&self, kind: &str) -> bool {
        self.activation.read().contains_key(kind)
    }

    // ── session events ────────────────────────────────────────────────

    pub(crate) fn fire_session_created(&self, session: &ClusteredSession) {
        let listeners = self.session.read().clone();
        for l in &listeners {
            guarded("session_created", || l.session_created(session));
        }
    }

    /// Destroy notifications run in reverse registration order.
    pub(crate) fn fire_session_destroyed(&self, session: &ClusteredSession) {
        let listeners = self.session.read().clone();
        for l in listeners.iter().rev() {
            guarded("session_destroyed", || l.session_destroyed(session));
        }
    }

    // ── attribute events ──────────────────────────────────────────────

    pub(crate) fn fire_attribute_added(&self, event: &AttributeEvent<'_>) {
        let listeners = self.attribute.read().clone();
        for l in &listeners {
            guarded("attribute_added", || l.attribute_added(event));
        }
    }

    pub(crate) fn fire_attribute_replaced(&self, event: &AttributeEvent<'_>) {
        let listeners = self.attribute.read().clone();
        for l in &listeners {
            guarded("attribute_replaced", || l.attribute_replaced(event));
        }
    }

    pub(crate) fn fire_attribute_removed(&self, event: &AttributeEvent<'_>) {
        let listeners = self.attribute.read().clone();
        for l in &listeners {
            guarded("attribute_removed", || l.attribute_removed(event));
        }
    }

    // ── capability events ─────────────────────────────────────────────

    pub(crate) fn fire_bound(&self, event: &AttributeEvent<'_>) {
        if let Some(h) = self.binding_for(event.value) {
            guarded("value_bound", || h.value_bound(event));
        }
    }

    pub(crate) fn fire_unbound(&self, event: &AttributeEvent<'_>) {
        if let Some(h) = self.binding_for(event.value) {
            guarded("value_unbound", || h.value_unbound(event));
        }
    }

    pub(crate) fn fire_will_passivate(&self, event: &AttributeEvent<'_>) {
        if let Some(h) = self.activation_for(event.value) {
            guarded("will_passivate", || h.will_passivate(event));
        }
    }

    pub(crate) fn fire_did_activate(&self, event: &AttributeEvent<'_>) {
        if let Some(h) = self.activation_for(event.value) {
            guarded("did_activate", || h.did_activate(event));
        }
    }

    fn binding_for(&self, value: &AttributeValue) -> Option<Arc<dyn BindingListener>> {
        let kind = value.kind()?;
        self.binding.read().get(kind).cloned()
    }

    fn activation_for(&self, value: &AttributeValue) -> Option<Arc<dyn ActivationListener>> {
        let kind = value.kind()?;
        self.activation.read().get(kind).cloned()
    }
}

/// Run a listener callback, logging (never propagating) failures.
fn guarded(callback: &'static str, f: impl FnOnce() -> ListenerResult) {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            tracing::warn!(callback, error = %e, "session listener failed");
        }
        Err(_) => {
            tracing::error!(callback, "session listener panicked");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    struct Recorder {
        tag: &'static str,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl AttributeListener for Recorder {
        fn attribute_added(&self, event: &AttributeEvent<'_>) -> ListenerResult {
            self.log.lock().push(format!("{}:{}", self.tag, event.name));
            Ok(())
        }
    }

    struct Failing;

    impl AttributeListener for Failing {
        fn attribute_added(&self, _event: &AttributeEvent<'_>) -> ListenerResult {
            Err("boom".into())
        }
    }

    struct Panicking;

    impl AttributeListener for Panicking {
        fn attribute_added(&self, _event: &AttributeEvent<'_>) -> ListenerResult {
            panic!("listener bug");
        }
    }

    #[test]
    fn failing_listeners_do_not_stop_later_ones() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let registry = ListenerRegistry::new();
        registry.add_attribute_listener(Arc::new(Failing));
        registry.add_attribute_listener(Arc::new(Panicking));
        registry.add_attribute_listener(Arc::new(Recorder { tag: "a", log: log.clone() }));

        let value = AttributeValue::json(serde_json::json!(1));
        registry.fire_attribute_added(&AttributeEvent {
            session_id: "s1",
            name: "count",
            value: &value,
        });
        assert_eq!(*log.lock(), vec!["a:count".to_string()]);
    }

    #[test]
    fn capability_lookup_uses_kind() {
        struct Bound(Arc<Mutex<usize>>);
        impl BindingListener for Bound {
            fn value_bound(&self, _event: &AttributeEvent<'_>) -> ListenerResult {
                *self.0.lock() += 1;
                Ok(())
            }
        }

        let hits = Arc::new(Mutex::new(0));
        let registry = ListenerRegistry::new();
        registry.register_binding("cart", Arc::new(Bound(hits.clone())));

        let tagged = AttributeValue::typed("cart", serde_json::json!([]));
        let plain = AttributeValue::json(serde_json::json!([]));
        for value in [&tagged, &plain] {
            registry.fire_bound(&AttributeEvent {
                session_id: "s1",
                name: "cart",
                value,
            });
        }
        assert_eq!(*hits.lock(), 1);
    }
}
