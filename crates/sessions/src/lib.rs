//! Clustered HTTP session management.
//!
//! Sessions live in a per-node cache owned by a [`ClusterManager`] and are
//! replicated to a shared [`SessionStore`].  A [`SnapshotManager`] decides
//! when dirty sessions are pushed, the [`SessionReaper`] reconciles local
//! expiry with cluster-wide activity, and the [`SessionValve`] ties both to
//! the request lifecycle.  Session ids carry a route suffix so that a node
//! can adopt sessions created elsewhere after a failover.

pub mod attribute;
pub mod file_store;
pub mod listener;
pub mod manager;
pub mod reaper;
pub mod record;
pub mod route;
pub mod session;
pub mod snapshot;
pub mod store;
pub mod valve;
mod worker;

pub use attribute::AttributeValue;
pub use file_store::FileSessionStore;
pub use listener::{
    ActivationListener, AttributeEvent, AttributeListener, BindingListener, ListenerError,
    ListenerRegistry, ListenerResult, SessionListener,
};
pub use manager::ClusterManager;
pub use reaper::{ReapReport, SessionReaper};
pub use record::{SessionRecord, StoredAttribute};
pub use session::ClusteredSession;
pub use snapshot::{
    snapshot_manager_for, InstantSnapshotManager, IntervalSnapshotManager, SnapshotManager,
};
pub use store::{InMemorySessionStore, SessionStore};
pub use valve::{RequestContext, SessionValve};
