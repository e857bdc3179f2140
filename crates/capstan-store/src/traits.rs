use crate::error::StoreResult;

/// Ordered key-value store with prefix scans.
///
/// All implementations must satisfy these invariants:
/// - `get` after `put` returns the stored value; `get` after `delete`
///   returns `None`.
/// - `scan_prefix` returns every entry whose key starts with the prefix,
///   in ascending byte order of the full key, and nothing else.
/// - Individual operations are atomic; there are no multi-key
///   transactions.
pub trait DurableStore: Send + Sync {
    /// Read one value. Returns `Ok(None)` if the key does not exist.
    fn get(&self, key: &str) -> StoreResult<Option<serde_json::Value>>;

    /// Write one value, replacing any existing entry.
    fn put(&self, key: &str, value: &serde_json::Value) -> StoreResult<()>;

    /// Delete one entry. Returns `true` if the key existed.
    fn delete(&self, key: &str) -> StoreResult<bool>;

    /// All entries under `prefix`, in ascending key order.
    fn scan_prefix(&self, prefix: &str) -> StoreResult<Vec<(String, serde_json::Value)>>;
}

/// The exclusive upper bound for a prefix range scan: the prefix with its
/// last byte incremented. `None` when no upper bound exists (prefix is
/// empty or all `0xff`).
pub(crate) fn prefix_end(prefix: &str) -> Option<String> {
    let mut bytes = prefix.as_bytes().to_vec();
    while let Some(&last) = bytes.last() {
        if last < 0xff {
            *bytes.last_mut().unwrap() += 1;
            // Keys are ASCII-built, so the bumped byte stays valid UTF-8.
            return String::from_utf8(bytes).ok();
        }
        bytes.pop();
    }
    None
}
