//! Permissioned-ledger boundary.
//!
//! The ledger is both the source of truth and the message bus: notaries
//! coordinate exclusively by writing account details and observing the
//! committed block stream. Command order within a block defines the
//! happens-before relation every handler relies on.

use crate::foundation::{AccountId, AssetId, LedgerTxHash, NotaryId, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tokio::sync::mpsc;

pub mod memory;
pub mod topic;

pub use memory::MemoryLedger;
pub use topic::{SuffixWatcher, Topic};

/// The closed command vocabulary the bridge produces and observes.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum LedgerCommand {
    CreateAccount {
        account: AccountId,
    },
    SetAccountDetail {
        account: AccountId,
        key: String,
        value: String,
    },
    TransferAsset {
        source: AccountId,
        destination: AccountId,
        asset: AssetId,
        description: String,
        amount: u64,
    },
    SubtractAssetQuantity {
        account: AccountId,
        asset: AssetId,
        amount: u64,
    },
}

impl LedgerCommand {
    pub fn name(&self) -> &'static str {
        match self {
            LedgerCommand::CreateAccount { .. } => "CreateAccount",
            LedgerCommand::SetAccountDetail { .. } => "SetAccountDetail",
            LedgerCommand::TransferAsset { .. } => "TransferAsset",
            LedgerCommand::SubtractAssetQuantity { .. } => "SubtractAssetQuantity",
        }
    }
}

/// An unsigned transaction as the bridge submits it.
///
/// `created_time_ms` must be the wall-clock time of the triggering event: the
/// ledger enforces a freshness window and rejects anything outside it.
/// `quorum` is the creator account's signatory quorum as read immediately
/// before building; a stale value is rejected with `StaleQuorum`.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct LedgerTransaction {
    pub creator: AccountId,
    pub created_time_ms: u64,
    pub quorum: u32,
    pub commands: Vec<LedgerCommand>,
}

impl LedgerTransaction {
    pub fn hash(&self) -> LedgerTxHash {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.creator.as_bytes());
        hasher.update(&self.created_time_ms.to_le_bytes());
        hasher.update(&self.quorum.to_le_bytes());
        for command in &self.commands {
            // Commands are plain serde structs; JSON is the canonical form.
            if let Ok(json) = serde_json::to_vec(command) {
                hasher.update(&json);
            }
        }
        LedgerTxHash::new(*hasher.finalize().as_bytes())
    }
}

/// One command inside a committed block, tagged with its writer.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommittedCommand {
    pub creator: AccountId,
    pub created_time_ms: u64,
    pub command: LedgerCommand,
}

/// A committed ledger block with its ordered command list.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LedgerBlock {
    pub height: u64,
    pub created_at_ms: u64,
    pub commands: Vec<CommittedCommand>,
}

/// Ordered stream of committed blocks. Dropping the subscription detaches it.
pub struct LedgerBlockSubscription {
    receiver: mpsc::UnboundedReceiver<LedgerBlock>,
}

impl LedgerBlockSubscription {
    pub fn new(receiver: mpsc::UnboundedReceiver<LedgerBlock>) -> Self {
        Self { receiver }
    }

    /// Next committed block; `None` once the ledger side shut down.
    pub async fn next(&mut self) -> Option<LedgerBlock> {
        self.receiver.recv().await
    }
}

/// The ledger operations the bridge consumes.
#[async_trait]
pub trait LedgerApi: Send + Sync {
    /// Submits a transaction; resolves once committed or rejected.
    async fn submit(&self, tx: LedgerTransaction) -> Result<LedgerTxHash>;

    /// All details of `account`, optionally restricted to one writer.
    /// Key collisions between writers resolve to the writer-scoped value.
    async fn account_details(&self, account: &AccountId, writer: Option<&AccountId>) -> Result<BTreeMap<String, String>>;

    /// Current signatory quorum of `account`.
    async fn account_quorum(&self, account: &AccountId) -> Result<u32>;

    /// Subscribes to committed blocks from the current tip onward.
    async fn subscribe_blocks(&self) -> Result<LedgerBlockSubscription>;
}

/// Detail key under which one notary's contribution lives on a shared
/// account. The writer identity doubles as the key so contributions stay
/// one-per-notary by construction.
pub fn notary_detail_key(notary: &NotaryId) -> String {
    notary.as_str().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transaction_hash_is_deterministic_and_sensitive() {
        let tx = LedgerTransaction {
            creator: AccountId::new("notary_a@notary"),
            created_time_ms: 1_700_000_000_000,
            quorum: 1,
            commands: vec![LedgerCommand::CreateAccount { account: AccountId::new("free_1@btcSession") }],
        };
        assert_eq!(tx.hash(), tx.hash());

        let mut other = tx.clone();
        other.created_time_ms += 1;
        assert_ne!(other.hash(), tx.hash());

        let mut other = tx.clone();
        other.commands.push(LedgerCommand::SetAccountDetail {
            account: AccountId::new("free_1@btcSession"),
            key: "expected_peers".to_string(),
            value: "4".to_string(),
        });
        assert_ne!(other.hash(), tx.hash());
    }
}
