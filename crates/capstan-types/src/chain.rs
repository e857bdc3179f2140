use serde::{Deserialize, Serialize};

/// Ledger liveness report delivered on every chain-state event.
///
/// Contract queries are only meaningful against a settled node: one that
/// reports itself in sync and whose current height has caught up with the
/// network tip. Events that arrive while unsettled are ignored entirely;
/// the next event re-evaluates from scratch.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainState {
    pub is_in_sync: bool,
    pub tip_height: u64,
    pub current_height: u64,
}

impl ChainState {
    /// Returns `true` when contract queries may proceed.
    pub fn is_settled(&self) -> bool {
        self.is_in_sync && self.tip_height == self.current_height
    }
}
