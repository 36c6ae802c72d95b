//! Session attribute values.
//!
//! Replicated values are JSON documents, optionally tagged with a `kind`
//! that selects binding/activation handlers from the listener registry.
//! In-process values that cannot be serialized are carried as `Local`.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;

use crate::record::StoredAttribute;

#[derive(Clone)]
pub enum AttributeValue {
    /// A serializable value.  `kind` names the capability handlers that
    /// apply to it, and survives replication.
    Data {
        kind: Option<String>,
        value: serde_json::Value,
    },
    /// An in-process object.  Never replicated.
    Local(Arc<dyn Any + Send + Sync>),
}

impl AttributeValue {
    /// An untagged JSON value.
    pub fn json(value: serde_json::Value) -> Self {
        Self::Data { kind: None, value }
    }

    /// A JSON value tagged with a capability kind.
    pub fn typed(kind: impl Into<String>, value: serde_json::Value) -> Self {
        Self::Data {
            kind: Some(kind.into()),
            value,
        }
    }

    pub fn local(value: Arc<dyn Any + Send + Sync>) -> Self {
        Self::Local(value)
    }

    pub fn kind(&self) -> Option<&str> {
        match self {
            Self::Data { kind, .. } => kind.as_deref(),
            Self::Local(_) => None,
        }
    }

    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            Self::Data { value, .. } => Some(value),
            Self::Local(_) => None,
        }
    }

    /// Deserialize the JSON payload into `T`.  `None` for local values or
    /// when the payload does not match `T`.
    pub fn to_typed<T: DeserializeOwned>(&self) -> Option<T> {
        self.as_json()
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    pub fn as_local<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        match self {
            Self::Local(obj) => obj.clone().downcast::<T>().ok(),
            Self::Data { .. } => None,
        }
    }

    pub fn is_serializable(&self) -> bool {
        matches!(self, Self::Data { .. })
    }

    /// Untagged JSON `null`, which `set_attribute` treats as a removal.
    pub fn is_null(&self) -> bool {
        matches!(
            self,
            Self::Data {
                kind: None,
                value: serde_json::Value::Null
            }
        )
    }

    /// Immutable scalar values: strings, numbers, booleans and null.  Reading
    /// one of these cannot hand out a reference that is later mutated.
    pub fn is_primitive(&self) -> bool {
        match self {
            Self::Data { kind: None, value } => matches!(
                value,
                serde_json::Value::String(_)
                    | serde_json::Value::Number(_)
                    | serde_json::Value::Bool(_)
                    | serde_json::Value::Null
            ),
            _ => false,
        }
    }

    pub(crate) fn to_stored(&self) -> Option<StoredAttribute> {
        match self {
            Self::Data { kind, value } => Some(StoredAttribute {
                kind: kind.clone(),
                value: value.clone(),
            }),
            Self::Local(_) => None,
        }
    }
}

impl From<StoredAttribute> for AttributeValue {
    fn from(stored: StoredAttribute) -> Self {
        Self::Data {
            kind: stored.kind,
            value: stored.value,
        }
    }
}

impl From<serde_json::Value> for AttributeValue {
    fn from(value: serde_json::Value) -> Self {
        Self::json(value)
    }
}

impl PartialEq for AttributeValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (
                Self::Data { kind: k1, value: v1 },
                Self::Data { kind: k2, value: v2 },
            ) => k1 == k2 && v1 == v2,
            (Self::Local(a), Self::Local(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Data { kind, value } => f
                .debug_struct("Data")
                .field("kind", kind)
                .field("value", value)
                .finish(),
            Self::Local(_) => f.write_str("Local(..)"),
        }
    }
}
