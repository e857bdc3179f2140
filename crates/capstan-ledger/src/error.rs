use thiserror::Error;

use capstan_link::RpcError;
use capstan_types::TypeError;

/// Errors from typed ledger operations.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// The remote call itself failed (either envelope level).
    #[error("rpc error: {0}")]
    Rpc(#[from] RpcError),

    /// The call succeeded but the result did not have the expected shape.
    #[error("unexpected response shape: {0}")]
    Shape(String),

    /// A returned identifier or payload failed to decode.
    #[error(transparent)]
    Type(#[from] TypeError),
}

/// Result alias for ledger operations.
pub type LedgerResult<T> = Result<T, LedgerError>;
