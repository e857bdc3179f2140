//! The Capstan sync engine.
//!
//! Three cooperating pieces turn ledger state into pinned objects:
//!
//! - [`Listener`] — routes link events: runs every subscriber's connect
//!   handshake on each (re)connection, enables the chain-state event
//!   stream, and fans each state event out to subscribers in isolated
//!   tasks.
//! - [`Dispatcher`] — one per tracked contract. Gates on chain settlement,
//!   discovers resources, diffs object listings against persisted cursors,
//!   and hands fresh work to per-resource watchers.
//! - [`Watcher`] — one per resource. Owns the pending-hash queue and
//!   drains it one object at a time (fetch, decode, pin), newest first,
//!   persisting resumable progress at drain boundaries.
//!
//! Fault policy: transport faults stay inside the link; per-object faults
//! feed the [`RetryPolicy`] and eventually the dead-letter namespace;
//! a missing contract or a failed event subscription is fatal and
//! surfaces as an `Err` from [`Listener::run`].

pub mod dispatcher;
pub mod error;
pub mod listener;
pub mod retry;
pub mod subscriber;
pub mod watcher;

pub use dispatcher::{Dispatcher, DispatcherConfig};
pub use error::{EngineError, EngineResult};
pub use listener::Listener;
pub use retry::RetryPolicy;
pub use subscriber::Subscriber;
pub use watcher::{Watcher, WatcherStatus};
