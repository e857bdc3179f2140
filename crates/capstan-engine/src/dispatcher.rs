use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::json;

use capstan_ledger::LedgerApi;
use capstan_store::{records, CursorRecord, DurableStore, Keyspace, PendingRecord};
use capstan_types::{ChainState, ObjectHash, ResourceId, StatusSource};

use crate::error::{EngineError, EngineResult};
use crate::retry::RetryPolicy;
use crate::subscriber::Subscriber;
use crate::watcher::Watcher;

/// Dispatcher configuration for one tracked contract.
#[derive(Clone, Debug)]
pub struct DispatcherConfig {
    /// Human-readable label used in logs and the status report.
    pub title: String,
    /// Re-seed watchers from surviving pending records on the first
    /// settled chain state after startup.
    pub restart_pending: bool,
}

/// Discovers resources on one contract and keeps a watcher per resource.
///
/// Attached to the [`crate::Listener`] as a subscriber. Every settled
/// chain-state event triggers a full listing pass: resources are
/// discovered, each object listing is diffed against the persisted cursor,
/// and fresh eligible objects are handed to the resource's watcher.
/// Watchers are created lazily on first observation and live for the
/// process lifetime.
pub struct Dispatcher {
    config: DispatcherConfig,
    ledger: Arc<dyn LedgerApi>,
    store: Arc<dyn DurableStore>,
    keys: Keyspace,
    policy: RetryPolicy,
    restart_pending: AtomicBool,
    watchers: Mutex<HashMap<ResourceId, Watcher>>,
    /// Last count handed to each watcher; suppresses redundant enqueues
    /// between liveness ticks while a drain is still working.
    last_seen: Mutex<HashMap<ResourceId, u64>>,
}

impl Dispatcher {
    pub fn new(
        config: DispatcherConfig,
        ledger: Arc<dyn LedgerApi>,
        store: Arc<dyn DurableStore>,
        keys: Keyspace,
        policy: RetryPolicy,
    ) -> Self {
        let restart_pending = AtomicBool::new(config.restart_pending);
        Self {
            config,
            ledger,
            store,
            keys,
            policy,
            restart_pending,
            watchers: Mutex::new(HashMap::new()),
            last_seen: Mutex::new(HashMap::new()),
        }
    }

    /// The watcher for a resource, if one has been created.
    pub fn watcher(&self, id: ResourceId) -> Option<Watcher> {
        self.watchers.lock().expect("lock poisoned").get(&id).cloned()
    }

    /// Number of watchers currently alive.
    pub fn watcher_count(&self) -> usize {
        self.watchers.lock().expect("lock poisoned").len()
    }

    fn watcher_for(&self, id: ResourceId, initial_count: u64) -> Watcher {
        let mut watchers = self.watchers.lock().expect("lock poisoned");
        watchers
            .entry(id)
            .or_insert_with(|| {
                tracing::info!(resource = %id, contract = %self.keys.contract(), "creating watcher");
                Watcher::new(
                    id,
                    self.ledger.clone(),
                    self.store.clone(),
                    self.keys.clone(),
                    self.policy.clone(),
                    initial_count,
                )
            })
            .clone()
    }

    fn read_cursor(&self, id: ResourceId) -> Option<u64> {
        match records::read_record::<CursorRecord>(self.store.as_ref(), &self.keys.cursor(id)) {
            Ok(cursor) => Some(cursor.unwrap_or_default().count),
            Err(e) => {
                tracing::error!(resource = %id, error = %e, "failed to read cursor");
                None
            }
        }
    }

    /// Re-seed watchers from pending records that survived a crash or
    /// shutdown. A hash listed in a pending record and neither
    /// dead-lettered nor covered by an advanced cursor gets retried here.
    fn recover(&self) -> EngineResult<()> {
        let entries = self.store.scan_prefix(&self.keys.pending_prefix())?;
        if entries.is_empty() {
            return Ok(());
        }
        tracing::info!(
            contract = %self.keys.contract(),
            records = entries.len(),
            "restarting pending work"
        );
        for (key, value) in entries {
            let record: PendingRecord = match serde_json::from_value(value) {
                Ok(record) => record,
                Err(e) => {
                    tracing::warn!(key, error = %e, "skipping corrupt pending record");
                    continue;
                }
            };
            let cursor = self.read_cursor(record.resource_id).unwrap_or(0);
            tracing::info!(
                resource = %record.resource_id,
                outstanding = record.hashes.len(),
                "re-seeding watcher from pending record"
            );
            let watcher = self.watcher_for(record.resource_id, cursor);
            watcher.add_hashes(record.hashes, record.count);
        }
        Ok(())
    }

    /// Diff one resource's listing against its cursor and hand fresh
    /// eligible objects to its watcher. Listing and store faults are
    /// logged and skipped; the next liveness event re-evaluates from
    /// scratch.
    async fn sync_resource(&self, id: ResourceId) {
        let objects = match self.ledger.resource_objects(id).await {
            Ok(objects) => objects,
            Err(e) => {
                tracing::warn!(resource = %id, error = %e, "failed to load object listing");
                return;
            }
        };
        let count = objects.len() as u64;

        let Some(cursor) = self.read_cursor(id) else {
            return;
        };

        if count == cursor {
            // Fully synced; nothing to do.
            return;
        }
        if count < cursor {
            tracing::warn!(
                resource = %id,
                count,
                cursor,
                "ledger reports fewer objects than the cursor, skipping"
            );
            return;
        }

        {
            let mut last_seen = self.last_seen.lock().expect("lock poisoned");
            if last_seen.get(&id) == Some(&count) {
                drop(last_seen);
                // Already queued up to this count. Re-trigger an idle
                // watcher so objects awaiting retry get another pass.
                if let Some(watcher) = self.watcher(id) {
                    watcher.start_pin();
                }
                return;
            }
            last_seen.insert(id, count);
        }

        let fresh: Vec<ObjectHash> = objects[cursor as usize..]
            .iter()
            .filter(|entry| entry.tag.is_blob())
            .map(|entry| entry.hash.clone())
            .collect();

        tracing::info!(
            resource = %id,
            new_objects = count - cursor,
            eligible = fresh.len(),
            "resource ahead of cursor"
        );
        let watcher = self.watcher_for(id, cursor);
        watcher.add_hashes(fresh, count);
    }
}

#[async_trait]
impl Subscriber for Dispatcher {
    fn name(&self) -> &str {
        &self.config.title
    }

    async fn on_connect(&self) -> EngineResult<()> {
        let contracts = self.ledger.view_contracts().await?;
        let cid = self.keys.contract();
        if !contracts.iter().any(|c| &c.cid == cid) {
            return Err(EngineError::ContractMissing { cid: cid.clone() });
        }
        tracing::info!(contract = %cid, title = self.config.title, "contract present on node");
        Ok(())
    }

    async fn on_chain_state(&self, state: &ChainState) -> EngineResult<()> {
        if !state.is_settled() {
            // Not in sync; no queries, no mutation. The next event
            // re-evaluates from scratch.
            tracing::debug!(
                tip = state.tip_height,
                current = state.current_height,
                in_sync = state.is_in_sync,
                "chain not settled, waiting"
            );
            return Ok(());
        }

        if self.restart_pending.swap(false, Ordering::SeqCst) {
            self.recover()?;
        }

        let resources = match self.ledger.list_resources().await {
            Ok(resources) => resources,
            Err(e) => {
                tracing::warn!(error = %e, "failed to list resources");
                return Ok(());
            }
        };
        if resources.is_empty() {
            tracing::debug!(contract = %self.keys.contract(), "no resources in contract");
            return Ok(());
        }

        for resource in resources {
            self.sync_resource(resource.id).await;
        }
        Ok(())
    }
}

impl StatusSource for Dispatcher {
    fn name(&self) -> &str {
        &self.config.title
    }

    fn status(&self) -> serde_json::Value {
        let watchers = self.watchers.lock().expect("lock poisoned");
        let mut resources = BTreeMap::new();
        let (mut pinned, mut failed, mut pending) = (0u64, 0u64, 0u64);
        for (id, watcher) in watchers.iter() {
            let snapshot = watcher.snapshot();
            pinned += snapshot.pinned;
            failed += snapshot.failed;
            pending += snapshot.pending as u64;
            resources.insert(id.get(), serde_json::to_value(&snapshot).unwrap_or_default());
        }
        json!({
            "contract": self.keys.contract().as_str(),
            "resources": resources,
            "totals": { "pinned": pinned, "failed": failed, "pending": pending },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::watcher::tests::{hash, wait_idle, MockLedger};
    use capstan_store::MemoryStore;
    use capstan_types::ContractId;

    fn settled() -> ChainState {
        ChainState {
            is_in_sync: true,
            tip_height: 100,
            current_height: 100,
        }
    }

    fn fixture(restart_pending: bool) -> (Arc<MockLedger>, Arc<MemoryStore>, Dispatcher) {
        let ledger = Arc::new(MockLedger::default());
        let store = Arc::new(MemoryStore::new());
        let dispatcher = Dispatcher::new(
            DispatcherConfig {
                title: "TEST".into(),
                restart_pending,
            },
            ledger.clone(),
            store.clone(),
            Keyspace::new(ContractId::parse("ab12").unwrap()),
            RetryPolicy::default(),
        );
        (ledger, store, dispatcher)
    }

    async fn drain_resource(dispatcher: &Dispatcher, id: ResourceId) {
        let watcher = dispatcher.watcher(id).expect("watcher should exist");
        wait_idle(&watcher).await;
    }

    #[tokio::test]
    async fn unsettled_state_issues_no_queries() {
        let (ledger, _, dispatcher) = fixture(false);
        let state = ChainState {
            is_in_sync: true,
            tip_height: 100,
            current_height: 98,
        };
        dispatcher.on_chain_state(&state).await.unwrap();
        assert_eq!(*ledger.list_calls.lock().unwrap(), 0);
        assert_eq!(dispatcher.watcher_count(), 0);
    }

    #[tokio::test]
    async fn blob_objects_are_pinned_and_cursor_advances() {
        let (ledger, store, dispatcher) = fixture(false);
        *ledger.resources.lock().unwrap() = vec![(
            7,
            vec![
                ("aa".into(), 0x01),
                ("bb".into(), 0x81),
                ("cc".into(), 0x81),
            ],
        )];

        dispatcher.on_chain_state(&settled()).await.unwrap();
        drain_resource(&dispatcher, ResourceId(7)).await;

        // Only the two blob-tagged objects, newest first.
        assert_eq!(ledger.pinned(), vec!["Qm-cc", "Qm-bb"]);

        let keys = Keyspace::new(ContractId::parse("ab12").unwrap());
        let cursor: CursorRecord =
            records::read_record(store.as_ref(), &keys.cursor(ResourceId(7)))
                .unwrap()
                .unwrap();
        assert_eq!(cursor.count, 3);
        assert_eq!(dispatcher.watcher(ResourceId(7)).unwrap().snapshot().pending, 0);
    }

    #[tokio::test]
    async fn unchanged_listing_is_a_no_op() {
        let (ledger, _, dispatcher) = fixture(false);
        *ledger.resources.lock().unwrap() =
            vec![(7, vec![("aa".into(), 0x81), ("bb".into(), 0x81)])];

        dispatcher.on_chain_state(&settled()).await.unwrap();
        drain_resource(&dispatcher, ResourceId(7)).await;
        assert_eq!(ledger.pinned().len(), 2);

        // Second pass with an unchanged count: no new watcher, no
        // duplicate enqueue.
        dispatcher.on_chain_state(&settled()).await.unwrap();
        drain_resource(&dispatcher, ResourceId(7)).await;
        assert_eq!(ledger.pinned().len(), 2);
        assert_eq!(dispatcher.watcher_count(), 1);
    }

    #[tokio::test]
    async fn growing_listing_enqueues_only_the_new_slice() {
        let (ledger, _, dispatcher) = fixture(false);
        *ledger.resources.lock().unwrap() = vec![(7, vec![("aa".into(), 0x81)])];

        dispatcher.on_chain_state(&settled()).await.unwrap();
        drain_resource(&dispatcher, ResourceId(7)).await;
        assert_eq!(ledger.pinned(), vec!["Qm-aa"]);

        *ledger.resources.lock().unwrap() =
            vec![(7, vec![("aa".into(), 0x81), ("bb".into(), 0x81)])];
        dispatcher.on_chain_state(&settled()).await.unwrap();
        drain_resource(&dispatcher, ResourceId(7)).await;
        assert_eq!(ledger.pinned(), vec!["Qm-aa", "Qm-bb"]);
    }

    #[tokio::test]
    async fn missing_contract_is_fatal_on_connect() {
        let ledger = Arc::new(MockLedger::default());
        let store = Arc::new(MemoryStore::new());
        let dispatcher = Dispatcher::new(
            DispatcherConfig {
                title: "TEST".into(),
                restart_pending: false,
            },
            ledger,
            store,
            Keyspace::new(ContractId::parse("dead").unwrap()),
            RetryPolicy::default(),
        );
        let err = dispatcher.on_connect().await.unwrap_err();
        assert!(matches!(err, EngineError::ContractMissing { .. }));
    }

    #[tokio::test]
    async fn present_contract_passes_handshake() {
        let (_, _, dispatcher) = fixture(false);
        dispatcher.on_connect().await.unwrap();
    }

    #[tokio::test]
    async fn pending_record_is_recovered_on_first_settled_state() {
        let (ledger, store, dispatcher) = fixture(true);
        let keys = Keyspace::new(ContractId::parse("ab12").unwrap());
        records::write_record(
            store.as_ref(),
            &keys.pending(ResourceId(7)),
            &PendingRecord {
                resource_id: ResourceId(7),
                count: 2,
                hashes: vec![hash("aa"), hash("bb")],
            },
        )
        .unwrap();

        dispatcher.on_chain_state(&settled()).await.unwrap();
        drain_resource(&dispatcher, ResourceId(7)).await;

        assert_eq!(ledger.pinned(), vec!["Qm-bb", "Qm-aa"]);
        let cursor: CursorRecord =
            records::read_record(store.as_ref(), &keys.cursor(ResourceId(7)))
                .unwrap()
                .unwrap();
        assert_eq!(cursor.count, 2);
        assert!(store.get(&keys.pending(ResourceId(7))).unwrap().is_none());
    }

    #[tokio::test]
    async fn status_aggregates_watcher_snapshots() {
        let (ledger, _, dispatcher) = fixture(false);
        *ledger.resources.lock().unwrap() = vec![(7, vec![("aa".into(), 0x81)])];
        dispatcher.on_chain_state(&settled()).await.unwrap();
        drain_resource(&dispatcher, ResourceId(7)).await;

        let status = StatusSource::status(&dispatcher);
        assert_eq!(status["contract"], "ab12");
        assert_eq!(status["totals"]["pinned"], 1);
        assert_eq!(status["totals"]["pending"], 0);
        assert_eq!(status["resources"]["7"]["pinned"], 1);
    }
}
