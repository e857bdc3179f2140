//! Typed ledger queries for Capstan.
//!
//! The ledger is an external collaborator reached through the link's
//! generic `call`: contract reads go through `invoke_contract` with a
//! comma-separated argument string, the pin capability is a plain method
//! call. This crate turns those envelopes into typed listings and hides
//! the argument-string grammar behind [`LedgerApi`], the seam the sync
//! engine consumes and tests mock.

pub mod api;
pub mod client;
pub mod error;

pub use api::{ContractInfo, LedgerApi, ResourceInfo, EV_CHAIN_STATE};
pub use client::LedgerClient;
pub use error::{LedgerError, LedgerResult};
