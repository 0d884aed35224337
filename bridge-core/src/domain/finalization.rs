//! Terminal withdrawal records.

use crate::domain::model::WithdrawalDetails;
use crate::foundation::{Result, MAX_ROLLBACK_REASON_CHARS};
use serde::{Deserialize, Serialize};

/// The record written to the withdrawal account on every successful
/// finalization, and mirrored into the structured audit log. Every field is a
/// deterministic function of the request and the broadcast transaction, so
/// all notaries produce the identical record (and thus the identical
/// settlement transaction).
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct FinalizationDetails {
    pub withdrawal: WithdrawalDetails,
    /// Fee collected into the billing account, in the ledger asset's units.
    pub fee_sat: u64,
    /// Public-chain transaction that moved the funds, hex txid.
    pub btc_txid: String,
}

impl FinalizationDetails {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Normalizes a rollback reason for use as a transfer description: lower-cased
/// and truncated so it always fits the ledger's description limit.
pub fn rollback_reason(reason: &str) -> String {
    reason.to_lowercase().chars().take(MAX_ROLLBACK_REASON_CHARS).collect()
}
