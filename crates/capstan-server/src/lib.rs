//! HTTP status surface for Capstan.
//!
//! A small axum application exposing aggregate sync status, single-record
//! inspection, and an upload passthrough to the storage network. Apart
//! from the plain liveness greeting, everything is gated by the configured
//! secret.

pub mod config;
pub mod error;
pub mod handler;
pub mod router;
pub mod server;

pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use router::{build_router, AppState};
pub use server::StatusServer;
