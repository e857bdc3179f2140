use thiserror::Error;

use capstan_ledger::LedgerError;
use capstan_link::RpcError;
use capstan_store::StoreError;
use capstan_types::ContractId;

/// Errors from the sync engine.
///
/// Everything here is process-fatal when it escapes [`crate::Listener::run`]:
/// recoverable conditions (per-object failures, listing errors, transport
/// resets) are handled and logged where they occur and never construct one
/// of these.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The tracked contract is not deployed on the node. An unrecoverable
    /// startup precondition.
    #[error("contract {cid} not found on the node")]
    ContractMissing { cid: ContractId },

    /// A connect handshake failed.
    #[error("connect handshake failed: {0}")]
    Handshake(#[from] LedgerError),

    /// The chain-event subscription request failed. The engine cannot make
    /// progress without liveness visibility, so there is no recovery path.
    #[error("chain-event subscription failed: {0}")]
    Subscription(RpcError),

    /// The subscription request completed but was not acknowledged.
    #[error("chain-event subscription rejected: {0}")]
    SubscriptionRejected(serde_json::Value),

    /// The event stream itself reported an error.
    #[error("event stream error: {0}")]
    EventStream(RpcError),

    /// Durable store failure during recovery.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// A spawned task failed in a way that should not happen.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Result alias for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;
