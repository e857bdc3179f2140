use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use serde::Serialize;

use capstan_ledger::{LedgerApi, LedgerError};
use capstan_store::{records, CursorRecord, DurableStore, FailedRecord, Keyspace, PendingRecord};
use capstan_types::{ObjectHash, ResourceId};

use crate::retry::RetryPolicy;

/// Snapshot of one watcher's state for the status surface.
#[derive(Clone, Debug, Serialize)]
pub struct WatcherStatus {
    pub resource_id: ResourceId,
    pub pending: usize,
    pub in_pin: bool,
    pub stable_count: u64,
    pub target_count: u64,
    pub pinned: u64,
    pub failed: u64,
}

struct State {
    /// Unprocessed hashes in insertion order. Drained from the back:
    /// newest objects are prioritized over older backlog.
    pending: Vec<ObjectHash>,
    /// Failure count per outstanding hash.
    attempts: HashMap<ObjectHash, u32>,
    /// Backoff gate per outstanding hash.
    not_before: HashMap<ObjectHash, Instant>,
    in_pin: bool,
    /// Last fully-confirmed object count (mirrors the cursor record).
    stable_count: u64,
    /// The count the current queue is working toward.
    target_count: u64,
    pinned: u64,
    failed: u64,
}

struct Inner {
    id: ResourceId,
    ledger: Arc<dyn LedgerApi>,
    store: Arc<dyn DurableStore>,
    keys: Keyspace,
    policy: RetryPolicy,
    state: Mutex<State>,
}

/// Per-resource pin engine.
///
/// Owns one resource's pending-hash queue and drains it strictly
/// sequentially — one in-flight fetch+pin at a time — to bound pressure on
/// the ledger and storage backend. Distinct resources' watchers drain
/// concurrently and independently.
///
/// Durable progress is written at drain boundaries only: a pending record
/// (with the outstanding hash snapshot) at drain start, the advanced
/// cursor and the record's removal at drain end. A crash mid-drain loses
/// exact progress within the batch but never which resource still has
/// outstanding work; recovery re-pins idempotently.
#[derive(Clone)]
pub struct Watcher {
    inner: Arc<Inner>,
}

enum MergeOutcome {
    StartDrain,
    ConfirmCount(u64),
    Nothing,
}

impl Watcher {
    pub fn new(
        id: ResourceId,
        ledger: Arc<dyn LedgerApi>,
        store: Arc<dyn DurableStore>,
        keys: Keyspace,
        policy: RetryPolicy,
        initial_count: u64,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                id,
                ledger,
                store,
                keys,
                policy,
                state: Mutex::new(State {
                    pending: Vec::new(),
                    attempts: HashMap::new(),
                    not_before: HashMap::new(),
                    in_pin: false,
                    stable_count: initial_count,
                    target_count: initial_count,
                    pinned: 0,
                    failed: 0,
                }),
            }),
        }
    }

    pub fn resource_id(&self) -> ResourceId {
        self.inner.id
    }

    /// Merge new hashes into the pending set (set union; re-adding an
    /// outstanding hash is a no-op) and raise the target count. Restarts
    /// draining if the watcher is idle. A slice with no eligible objects
    /// confirms the new count directly.
    pub fn add_hashes(&self, hashes: Vec<ObjectHash>, new_count: u64) {
        let outcome = {
            let mut st = self.lock();
            for hash in hashes {
                if !st.pending.contains(&hash) {
                    st.pending.push(hash);
                }
            }
            if new_count > st.target_count {
                st.target_count = new_count;
            }
            if st.in_pin {
                MergeOutcome::Nothing
            } else if st.pending.is_empty() {
                if st.target_count > st.stable_count {
                    let target = st.target_count;
                    st.stable_count = target;
                    MergeOutcome::ConfirmCount(target)
                } else {
                    MergeOutcome::Nothing
                }
            } else {
                MergeOutcome::StartDrain
            }
        };

        match outcome {
            MergeOutcome::StartDrain => self.start_pin(),
            MergeOutcome::ConfirmCount(count) => self.write_confirmed(count),
            MergeOutcome::Nothing => {}
        }
    }

    /// Idempotent drain entry point: a no-op while already draining or
    /// with nothing queued.
    pub fn start_pin(&self) {
        {
            let mut st = self.lock();
            if st.in_pin || st.pending.is_empty() {
                return;
            }
            st.in_pin = true;
        }
        let this = self.clone();
        tokio::spawn(async move {
            this.drain().await;
        });
    }

    /// Returns `true` while a drain task is running.
    pub fn is_draining(&self) -> bool {
        self.lock().in_pin
    }

    pub fn snapshot(&self) -> WatcherStatus {
        let st = self.lock();
        WatcherStatus {
            resource_id: self.inner.id,
            pending: st.pending.len(),
            in_pin: st.in_pin,
            stable_count: st.stable_count,
            target_count: st.target_count,
            pinned: st.pinned,
            failed: st.failed,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.inner.state.lock().expect("lock poisoned")
    }

    async fn drain(&self) {
        self.persist_pending_record();
        tracing::info!(resource = %self.inner.id, "drain started");

        // Hashes that failed during this pass; they stay pending but are
        // not re-attempted until the next trigger.
        let mut deferred: HashSet<ObjectHash> = HashSet::new();
        loop {
            let Some(hash) = self.next_eligible(&deferred) else {
                break;
            };
            match self.process(&hash).await {
                Ok(()) => self.confirm(&hash),
                Err(e) => {
                    let dead_lettered = self.record_failure(&hash, &e);
                    if !dead_lettered {
                        deferred.insert(hash);
                    }
                }
            }
        }

        self.finish_drain();
    }

    /// The most-recently-added hash that is neither deferred in this pass
    /// nor gated by backoff.
    fn next_eligible(&self, deferred: &HashSet<ObjectHash>) -> Option<ObjectHash> {
        let st = self.lock();
        let now = Instant::now();
        st.pending
            .iter()
            .rev()
            .find(|hash| {
                !deferred.contains(*hash)
                    && st.not_before.get(*hash).map_or(true, |&gate| gate <= now)
            })
            .cloned()
    }

    /// One unit of work: fetch the object's payload, decode the storage
    /// address, invoke the pin capability.
    async fn process(&self, hash: &ObjectHash) -> Result<(), LedgerError> {
        let address = self.inner.ledger.fetch_object(self.inner.id, hash).await?;
        self.inner.ledger.pin(&address).await?;
        Ok(())
    }

    fn confirm(&self, hash: &ObjectHash) {
        let mut st = self.lock();
        st.pending.retain(|h| h != hash);
        st.attempts.remove(hash);
        st.not_before.remove(hash);
        st.pinned += 1;
        tracing::info!(resource = %self.inner.id, hash = hash.short(), "object pinned");
    }

    /// Apply the retry policy to a failed object. Returns `true` when the
    /// object was dead-lettered (removed from pending).
    fn record_failure(&self, hash: &ObjectHash, error: &LedgerError) -> bool {
        let mut st = self.lock();
        let attempts = {
            let counter = st.attempts.entry(hash.clone()).or_insert(0);
            *counter += 1;
            *counter
        };

        if self.inner.policy.is_exhausted(attempts) {
            st.pending.retain(|h| h != hash);
            st.attempts.remove(hash);
            st.not_before.remove(hash);
            st.failed += 1;
            drop(st);

            let record = FailedRecord {
                resource_id: self.inner.id,
                hash: hash.clone(),
                attempts,
                error: error.to_string(),
            };
            let key = self.inner.keys.failed(self.inner.id, hash);
            if let Err(e) = records::write_record(self.inner.store.as_ref(), &key, &record) {
                tracing::error!(error = %e, key, "failed to write dead-letter record");
            }
            tracing::warn!(
                resource = %self.inner.id,
                hash = hash.short(),
                attempts,
                error = %error,
                "object dead-lettered"
            );
            true
        } else {
            let delay = self.inner.policy.backoff(attempts);
            st.not_before.insert(hash.clone(), Instant::now() + delay);
            drop(st);
            tracing::warn!(
                resource = %self.inner.id,
                hash = hash.short(),
                attempts,
                retry_in_ms = delay.as_millis() as u64,
                error = %error,
                "object failed, left pending"
            );
            false
        }
    }

    fn finish_drain(&self) {
        let (confirmed, remaining) = {
            let mut st = self.lock();
            st.in_pin = false;
            if st.pending.is_empty() {
                let target = st.target_count;
                st.stable_count = target;
                (Some(target), 0)
            } else {
                (None, st.pending.len())
            }
        };

        match confirmed {
            Some(count) => {
                self.write_confirmed(count);
                tracing::info!(resource = %self.inner.id, count, "drain complete");
            }
            None => {
                // Keep the pending record current so a restart re-seeds
                // exactly the outstanding hashes.
                self.persist_pending_record();
                tracing::info!(
                    resource = %self.inner.id,
                    remaining,
                    "drain paused with outstanding objects"
                );
            }
        }
    }

    /// Advance the cursor and retire the pending record. Two independent
    /// writes: a crash between them is tolerated by idempotent
    /// re-derivation on the next startup.
    fn write_confirmed(&self, count: u64) {
        let store = self.inner.store.as_ref();
        let cursor_key = self.inner.keys.cursor(self.inner.id);
        if let Err(e) = records::write_record(store, &cursor_key, &CursorRecord { count }) {
            tracing::error!(error = %e, key = cursor_key, "failed to advance cursor");
        }
        let pending_key = self.inner.keys.pending(self.inner.id);
        if let Err(e) = store.delete(&pending_key) {
            tracing::error!(error = %e, key = pending_key, "failed to retire pending record");
        }
    }

    fn persist_pending_record(&self) {
        let record = {
            let st = self.lock();
            PendingRecord {
                resource_id: self.inner.id,
                count: st.target_count,
                hashes: st.pending.clone(),
            }
        };
        let key = self.inner.keys.pending(self.inner.id);
        if let Err(e) = records::write_record(self.inner.store.as_ref(), &key, &record) {
            tracing::error!(error = %e, key, "failed to write pending record");
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use async_trait::async_trait;
    use capstan_ledger::{ContractInfo, LedgerResult, ResourceInfo};
    use capstan_store::{DurableStore, MemoryStore};
    use capstan_types::{ContractId, ObjectEntry, StorageAddress};
    use std::time::Duration;

    /// Scripted ledger: fetch returns `Qm-<hash>`, pins fail for the
    /// configured hashes.
    #[derive(Default)]
    pub(crate) struct MockLedger {
        pub fail_pins: Mutex<HashSet<String>>,
        pub fail_fetches: Mutex<HashSet<String>>,
        pub pins: Mutex<Vec<String>>,
        pub fetches: Mutex<Vec<String>>,
        pub resources: Mutex<Vec<(u64, Vec<(String, u8)>)>>,
        pub list_calls: Mutex<u64>,
    }

    impl MockLedger {
        pub fn pinned(&self) -> Vec<String> {
            self.pins.lock().unwrap().clone()
        }

        pub fn fail_pin_for(&self, hash: &str) {
            self.fail_pins.lock().unwrap().insert(format!("Qm-{hash}"));
        }
    }

    #[async_trait]
    impl LedgerApi for MockLedger {
        async fn view_contracts(&self) -> LedgerResult<Vec<ContractInfo>> {
            Ok(vec![ContractInfo {
                cid: ContractId::parse("ab12").unwrap(),
            }])
        }

        async fn list_resources(&self) -> LedgerResult<Vec<ResourceInfo>> {
            *self.list_calls.lock().unwrap() += 1;
            Ok(self
                .resources
                .lock()
                .unwrap()
                .iter()
                .map(|(id, _)| ResourceInfo {
                    id: ResourceId(*id),
                })
                .collect())
        }

        async fn resource_objects(&self, id: ResourceId) -> LedgerResult<Vec<ObjectEntry>> {
            let resources = self.resources.lock().unwrap();
            let objects = resources
                .iter()
                .find(|(rid, _)| *rid == id.get())
                .map(|(_, objs)| objs.clone())
                .unwrap_or_default();
            Ok(objects
                .into_iter()
                .map(|(hash, tag)| ObjectEntry::new(ObjectHash::parse(&hash).unwrap(), tag))
                .collect())
        }

        async fn fetch_object(
            &self,
            _id: ResourceId,
            hash: &ObjectHash,
        ) -> LedgerResult<StorageAddress> {
            self.fetches.lock().unwrap().push(hash.to_string());
            if self.fail_fetches.lock().unwrap().contains(hash.as_str()) {
                return Err(LedgerError::Shape("fetch refused".into()));
            }
            Ok(StorageAddress::new(format!("Qm-{hash}")))
        }

        async fn pin(&self, address: &StorageAddress) -> LedgerResult<()> {
            if self.fail_pins.lock().unwrap().contains(address.as_str()) {
                return Err(LedgerError::Shape("pin refused".into()));
            }
            self.pins.lock().unwrap().push(address.as_str().to_string());
            Ok(())
        }
    }

    pub(crate) fn hash(s: &str) -> ObjectHash {
        ObjectHash::parse(s).unwrap()
    }

    pub(crate) async fn wait_idle(watcher: &Watcher) {
        for _ in 0..400 {
            if !watcher.is_draining() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("watcher did not go idle");
    }

    fn fixture(policy: RetryPolicy) -> (Arc<MockLedger>, Arc<MemoryStore>, Watcher) {
        let ledger = Arc::new(MockLedger::default());
        let store = Arc::new(MemoryStore::new());
        let keys = Keyspace::new(ContractId::parse("ab12").unwrap());
        let watcher = Watcher::new(
            ResourceId(7),
            ledger.clone(),
            store.clone(),
            keys,
            policy,
            0,
        );
        (ledger, store, watcher)
    }

    fn cursor_count(store: &MemoryStore) -> Option<u64> {
        let keys = Keyspace::new(ContractId::parse("ab12").unwrap());
        records::read_record::<CursorRecord>(store, &keys.cursor(ResourceId(7)))
            .unwrap()
            .map(|c| c.count)
    }

    #[tokio::test]
    async fn drains_newest_first_and_advances_cursor() {
        let (ledger, store, watcher) = fixture(RetryPolicy::default());
        watcher.add_hashes(vec![hash("a1"), hash("b2"), hash("c3")], 3);
        wait_idle(&watcher).await;

        // LIFO: the most recently added hash is pinned first.
        assert_eq!(ledger.pinned(), vec!["Qm-c3", "Qm-b2", "Qm-a1"]);
        assert_eq!(cursor_count(&store), Some(3));

        let status = watcher.snapshot();
        assert_eq!(status.pending, 0);
        assert!(!status.in_pin);
        assert_eq!(status.stable_count, 3);
        assert_eq!(status.pinned, 3);

        // Pending record retired at drain end.
        let keys = Keyspace::new(ContractId::parse("ab12").unwrap());
        assert!(store.get(&keys.pending(ResourceId(7))).unwrap().is_none());
    }

    #[tokio::test]
    async fn failing_object_stays_pending_and_cursor_holds() {
        let (ledger, store, watcher) = fixture(RetryPolicy::default());
        ledger.fail_pin_for("b2");

        watcher.add_hashes(vec![hash("a1"), hash("b2"), hash("c3")], 3);
        wait_idle(&watcher).await;

        assert_eq!(ledger.pinned(), vec!["Qm-c3", "Qm-a1"]);
        let status = watcher.snapshot();
        assert_eq!(status.pending, 1);
        assert!(!status.in_pin);
        assert_eq!(status.stable_count, 0);
        assert_eq!(cursor_count(&store), None);

        // The pending record still names the outstanding hash.
        let keys = Keyspace::new(ContractId::parse("ab12").unwrap());
        let record: PendingRecord =
            records::read_record(store.as_ref(), &keys.pending(ResourceId(7)))
                .unwrap()
                .unwrap();
        assert_eq!(record.hashes, vec![hash("b2")]);
        assert_eq!(record.count, 3);
    }

    #[tokio::test]
    async fn exhausted_object_is_dead_lettered() {
        let policy = RetryPolicy {
            max_attempts: 1,
            ..Default::default()
        };
        let (ledger, store, watcher) = fixture(policy);
        ledger.fail_pin_for("b2");

        watcher.add_hashes(vec![hash("a1"), hash("b2")], 2);
        wait_idle(&watcher).await;

        // Dead letters no longer block the cursor.
        assert_eq!(cursor_count(&store), Some(2));
        let status = watcher.snapshot();
        assert_eq!(status.pending, 0);
        assert_eq!(status.failed, 1);

        let keys = Keyspace::new(ContractId::parse("ab12").unwrap());
        let record: FailedRecord =
            records::read_record(store.as_ref(), &keys.failed(ResourceId(7), &hash("b2")))
                .unwrap()
                .unwrap();
        assert_eq!(record.attempts, 1);
        assert_eq!(record.resource_id, ResourceId(7));
    }

    #[tokio::test]
    async fn merge_is_set_union() {
        let (ledger, _, watcher) = fixture(RetryPolicy::default());
        watcher.add_hashes(vec![hash("a1"), hash("a1"), hash("a1")], 1);
        wait_idle(&watcher).await;
        assert_eq!(ledger.pinned(), vec!["Qm-a1"]);
    }

    #[tokio::test]
    async fn slice_with_no_eligible_objects_confirms_count() {
        let (ledger, store, watcher) = fixture(RetryPolicy::default());
        watcher.add_hashes(Vec::new(), 5);
        assert!(!watcher.is_draining());
        assert_eq!(cursor_count(&store), Some(5));
        assert!(ledger.pinned().is_empty());
        assert_eq!(watcher.snapshot().stable_count, 5);
    }

    #[tokio::test]
    async fn backoff_gates_the_next_pass() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay_ms: 60_000,
            max_delay_ms: 60_000,
        };
        let (ledger, _, watcher) = fixture(policy);
        ledger.fail_pin_for("a1");

        watcher.add_hashes(vec![hash("a1")], 1);
        wait_idle(&watcher).await;
        let fetches_after_first = ledger.fetches.lock().unwrap().len();
        assert_eq!(fetches_after_first, 1);

        // Re-trigger immediately: the hash is still backing off, so the
        // pass ends without touching it.
        watcher.start_pin();
        wait_idle(&watcher).await;
        assert_eq!(ledger.fetches.lock().unwrap().len(), 1);
        assert_eq!(watcher.snapshot().pending, 1);
    }

    #[tokio::test]
    async fn re_arm_while_idle_restarts_draining() {
        let (ledger, store, watcher) = fixture(RetryPolicy::default());
        watcher.add_hashes(vec![hash("a1")], 1);
        wait_idle(&watcher).await;
        assert_eq!(cursor_count(&store), Some(1));

        watcher.add_hashes(vec![hash("b2")], 2);
        wait_idle(&watcher).await;
        assert_eq!(ledger.pinned(), vec!["Qm-a1", "Qm-b2"]);
        assert_eq!(cursor_count(&store), Some(2));
    }
}
