use std::collections::BTreeMap;
use std::sync::RwLock;

use crate::error::StoreResult;
use crate::traits::{prefix_end, DurableStore};

/// In-memory, `BTreeMap`-based store.
///
/// Intended for tests and embedding. The map is ordered by construction,
/// so prefix scans fall out of a plain range query.
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<BTreeMap<String, serde_json::Value>>,
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries currently stored.
    pub fn len(&self) -> usize {
        self.entries.read().expect("lock poisoned").len()
    }

    /// Returns `true` if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.read().expect("lock poisoned").is_empty()
    }
}

impl DurableStore for MemoryStore {
    fn get(&self, key: &str) -> StoreResult<Option<serde_json::Value>> {
        let map = self.entries.read().expect("lock poisoned");
        Ok(map.get(key).cloned())
    }

    fn put(&self, key: &str, value: &serde_json::Value) -> StoreResult<()> {
        let mut map = self.entries.write().expect("lock poisoned");
        map.insert(key.to_string(), value.clone());
        Ok(())
    }

    fn delete(&self, key: &str) -> StoreResult<bool> {
        let mut map = self.entries.write().expect("lock poisoned");
        Ok(map.remove(key).is_some())
    }

    fn scan_prefix(&self, prefix: &str) -> StoreResult<Vec<(String, serde_json::Value)>> {
        let map = self.entries.read().expect("lock poisoned");
        let entries: Vec<(String, serde_json::Value)> = match prefix_end(prefix) {
            Some(end) => map
                .range(prefix.to_string()..end)
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            None => map
                .range(prefix.to_string()..)
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        };
        Ok(entries)
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("entries", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn put_get_delete() {
        let store = MemoryStore::new();
        store.put("a", &json!(1)).unwrap();
        assert_eq!(store.get("a").unwrap(), Some(json!(1)));
        assert!(store.delete("a").unwrap());
        assert_eq!(store.get("a").unwrap(), None);
        assert!(!store.delete("a").unwrap());
    }

    #[test]
    fn put_replaces() {
        let store = MemoryStore::new();
        store.put("k", &json!({"v": 1})).unwrap();
        store.put("k", &json!({"v": 2})).unwrap();
        assert_eq!(store.get("k").unwrap(), Some(json!({"v": 2})));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn scan_prefix_is_contiguous_and_ordered() {
        let store = MemoryStore::new();
        store.put("pending/a/2", &json!(2)).unwrap();
        store.put("pending/a/1", &json!(1)).unwrap();
        store.put("pending/b/1", &json!(3)).unwrap();
        store.put("cursor/a/1", &json!(0)).unwrap();

        let hits = store.scan_prefix("pending/a/").unwrap();
        let keys: Vec<&str> = hits.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["pending/a/1", "pending/a/2"]);
    }

    #[test]
    fn scan_empty_prefix_returns_everything() {
        let store = MemoryStore::new();
        store.put("x", &json!(1)).unwrap();
        store.put("y", &json!(2)).unwrap();
        assert_eq!(store.scan_prefix("").unwrap().len(), 2);
    }
}
