use serde::{Deserialize, Serialize};

use capstan_types::{ObjectHash, ResourceId};

use crate::error::StoreResult;
use crate::traits::DurableStore;

/// Per-resource cursor: how much of the object list has been fully
/// processed. Advanced only when a drain confirms every object up to
/// `count` as pinned or dead-lettered.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct CursorRecord {
    pub count: u64,
}

/// Per-resource pending marker, written when a drain starts and deleted
/// when it fully confirms. Carries the outstanding hash snapshot so a
/// restart can re-seed the queue without consulting the ledger first.
///
/// A hash listed here that is neither dead-lettered nor covered by an
/// advanced cursor is retried on next startup. Re-pinning an object that
/// completed just before a crash is harmless; pinning is idempotent.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingRecord {
    pub resource_id: ResourceId,
    /// The object count this drain is working toward.
    pub count: u64,
    /// Outstanding hashes at drain start, oldest first.
    pub hashes: Vec<ObjectHash>,
}

/// One object that exhausted its retry budget. Kept for inspection; never
/// retried automatically.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedRecord {
    pub resource_id: ResourceId,
    pub hash: ObjectHash,
    pub attempts: u32,
    pub error: String,
}

/// Typed read helper: decode a stored JSON value into a record.
pub fn read_record<T: serde::de::DeserializeOwned>(
    store: &dyn DurableStore,
    key: &str,
) -> StoreResult<Option<T>> {
    match store.get(key)? {
        Some(value) => Ok(Some(serde_json::from_value(value)?)),
        None => Ok(None),
    }
}

/// Typed write helper: encode a record and store it.
pub fn write_record<T: Serialize>(
    store: &dyn DurableStore,
    key: &str,
    record: &T,
) -> StoreResult<()> {
    store.put(key, &serde_json::to_value(record)?)
}
