use async_trait::async_trait;

use capstan_types::ChainState;

use crate::error::EngineResult;

/// A component attached to the [`crate::Listener`].
///
/// Each subscriber participates in the connect handshake and receives
/// every decoded chain-state event. Handlers run in their own tasks: one
/// subscriber failing (or hanging) never blocks delivery to its peers.
#[async_trait]
pub trait Subscriber: Send + Sync {
    /// Short name for log lines and fault attribution.
    fn name(&self) -> &str;

    /// Connect handshake, re-run on every (re)connection. An `Err` here is
    /// fatal to the process.
    async fn on_connect(&self) -> EngineResult<()>;

    /// One decoded chain-state event. Errors are captured and logged per
    /// subscriber, never propagated to peers.
    async fn on_chain_state(&self, state: &ChainState) -> EngineResult<()>;
}
