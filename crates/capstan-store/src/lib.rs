//! Durable ordered key-value storage for Capstan.
//!
//! The sync engine tracks its progress in three logical namespaces:
//! per-resource cursors, per-resource pending markers, and dead-lettered
//! objects. All of them live behind the [`DurableStore`] trait — an ordered
//! key-value abstraction with prefix scans — so the engine never depends on
//! a concrete storage engine.
//!
//! # Backends
//!
//! - [`MemoryStore`] — `BTreeMap`-based store for tests and embedding
//! - [`SqliteStore`] — file-backed store (WAL mode) for production
//!
//! # Design Rules
//!
//! 1. Keys are built by concatenation so each namespace's keys sort
//!    contiguously; prefix scans must return exactly one namespace.
//! 2. Values are JSON. The store never interprets them.
//! 3. There are no cross-key transactions. A crash between two related
//!    writes is tolerated by idempotent re-derivation, not atomicity.

pub mod error;
pub mod keys;
pub mod memory;
pub mod records;
pub mod sqlite;
pub mod traits;

pub use error::{StoreError, StoreResult};
pub use keys::Keyspace;
pub use memory::MemoryStore;
pub use records::{CursorRecord, FailedRecord, PendingRecord};
pub use sqlite::SqliteStore;
pub use traits::DurableStore;
