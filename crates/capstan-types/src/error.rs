use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid hex string: {0}")]
    InvalidHex(String),

    #[error("invalid object hash: {0}")]
    InvalidHash(String),

    #[error("object payload is not valid UTF-8")]
    InvalidPayload,

    #[error("invalid contract id: {0}")]
    InvalidContractId(String),
}
