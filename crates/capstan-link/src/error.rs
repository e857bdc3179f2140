use thiserror::Error;

/// Errors establishing or using the link itself.
#[derive(Debug, Error)]
pub enum LinkError {
    /// The first connection attempt failed. Later disconnects never
    /// surface here; they feed the reconnect machine and its counters.
    #[error("connection failed: {0}")]
    Connect(#[from] std::io::Error),

    /// The background actor is gone (link shut down before connecting).
    #[error("link is closed")]
    Closed,
}

/// Errors carried by a completed RPC call.
///
/// Both envelope levels map here: a transport-level `error` field and an
/// `error` embedded in a remote computation's output document are
/// indistinguishable to callers, which is intentional — either way the
/// remote side rejected the request.
#[derive(Debug, Clone, Error)]
pub enum RpcError {
    /// The remote reported an error (either envelope level).
    #[error("remote error: {0}")]
    Remote(serde_json::Value),

    /// The response did not have the expected shape.
    #[error("malformed response: {0}")]
    Malformed(String),
}

/// Result alias for RPC calls.
pub type RpcResult<T> = Result<T, RpcError>;
