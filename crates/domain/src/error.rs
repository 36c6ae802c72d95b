/// Shared error type used across all session-cluster crates.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Operation on a session that has already been invalidated.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Attribute value cannot be replicated to the session store.
    #[error("attribute {name:?} is not serializable")]
    NotSerializable { name: String },

    #[error("session store: {0}")]
    Store(String),
}

pub type Result<T> = std::result::Result<T, Error>;
