//! Core library for the multi-notary Bitcoin custody bridge.
//!
//! Layered architecture:
//! - `foundation`: ids, errors, constants, small utilities
//! - `domain`: pure bridge logic (address derivation, confirmation state
//!   machine, withdrawal consensus, finalization records)
//! - `infrastructure`: boundaries to the permissioned ledger, the Bitcoin
//!   node, wallet persistence, configuration, health and audit
//! - `application`: the flows that tie the boundaries to the domain

pub mod application;
pub mod domain;
pub mod foundation;
pub mod infrastructure;

pub use foundation::{BridgeError, ErrorCode, Result};
