//! Foundation types for Capstan.
//!
//! This crate provides the identifiers and small value types shared by
//! every other Capstan crate: ledger-domain object hashes, storage-network
//! addresses, resource and contract identifiers, the chain liveness state,
//! and the status-snapshot seam used by the HTTP surface.
//!
//! # Key Types
//!
//! - [`ObjectHash`] — ledger-domain object identifier (hex string)
//! - [`StorageAddress`] — storage-network address decoded from object data
//! - [`ResourceId`] — identifier of one trackable unit on the ledger
//! - [`TypeTag`] — object type byte; the high bit marks pinnable blobs
//! - [`ChainState`] — ledger liveness report used to gate contract queries
//! - [`StatusSource`] — read-only status snapshot interface

pub mod chain;
pub mod error;
pub mod object;
pub mod resource;
pub mod status;

pub use chain::ChainState;
pub use error::TypeError;
pub use object::{ObjectEntry, ObjectHash, StorageAddress, TypeTag};
pub use resource::{ContractId, ResourceId};
pub use status::{StatusRegistry, StatusSource};
