//! Infrastructure layer: boundaries to the ledger, the public chain, wallet
//! persistence, configuration, health and audit.

pub mod audit;
pub mod chain;
pub mod config;
pub mod health;
pub mod ledger;
pub mod wallet;
