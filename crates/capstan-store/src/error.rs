use thiserror::Error;

/// Errors from durable store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database error from the backing engine.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A stored value is not valid JSON.
    #[error("corrupt record at {key}: {reason}")]
    CorruptRecord { key: String, reason: String },

    /// Serialization failure while encoding a value.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error from the underlying storage backend.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
