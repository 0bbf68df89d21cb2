//! Error types for session store operations.

/// Error type for session store operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Error from the external store backend.
    #[error("Store error: {0}")]
    Store(String),

    /// JSON (de)serialization failure.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A delta payload arrived for a session the receiver has no full state for.
    #[error("Delta received for unknown session: {0}")]
    DeltaWithoutBase(String),

    /// A notification carried neither a usable session value nor a session id.
    #[error("Notification carried no usable session or id (key: {0:?})")]
    UnresolvableNotification(String),

    /// Error from a lifecycle event sink.
    #[error("Event sink error: {0}")]
    Sink(String),

    /// Error from an interest subscription backend.
    #[error("Interest subscription error: {0}")]
    Subscription(String),
}

/// Result type for session store operations.
pub type Result<T> = std::result::Result<T, Error>;
