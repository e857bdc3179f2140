//! Persistent JSON-RPC client for the ledger node.
//!
//! The wire protocol is JSON values separated by single newlines over a
//! long-lived TCP connection. This crate owns everything about that
//! connection: framing, request/response correlation, unsolicited-event
//! dispatch, and automatic reconnection with a fixed backoff.
//!
//! # Call semantics
//!
//! [`Link::call`] resolves when the matching response arrives. If the
//! connection drops first, the call future **never resolves** — in-flight
//! calls are discarded on reset, not retried. Callers that need completion
//! guarantees subscribe to [`LinkEvent::Connected`] and re-issue work.
//!
//! # Response envelopes
//!
//! Responses carry a transport envelope (`result`/`error`) and, for remote
//! computation results, a second JSON document embedded as a string in
//! `result.output` with its own `error` field. Both levels are checked
//! independently; see [`codec::decode_response`].

pub mod codec;
pub mod error;
pub mod link;
pub mod stats;

pub use codec::{decode_response, LineCodec};
pub use error::{LinkError, RpcError, RpcResult};
pub use link::{CallTransport, Link, LinkConfig, LinkEvent};
pub use stats::LinkStats;
