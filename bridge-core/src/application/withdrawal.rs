//! Withdrawal consensus coordination.
//!
//! Before any notary co-signs, all of them must agree on the exact
//! transaction-construction parameters. Each notary publishes its local view
//! into a per-request accumulator account on the ledger; once a
//! super-majority of entries is present, everyone reduces the set to the
//! element-wise minimum and builds against that value, never against its own
//! view. Under-quorum requests stall open forever by design: broadcasting a
//! partially-signed spend is the one unrecoverable failure.

use crate::domain::consensus::reduce_entries;
use crate::domain::model::{ConsensusEntry, WithdrawalConsensus, WithdrawalDetails};
use crate::domain::quorum::super_majority;
use crate::foundation::util::time::now_millis;
use crate::foundation::{
    AccountId, AssetId, BridgeError, NotaryId, RequestId, Result, ACCUMULATOR_NAME_HEX_CHARS, CONSENSUS_DOMAIN,
    REQUEST_DETAILS_KEY, REQUEST_HASH_KEY,
};
use crate::application::peers::PeerListProvider;
use crate::application::settlement::SettlementService;
use crate::infrastructure::audit::{audit, AuditEvent};
use crate::infrastructure::chain::ChainNode;
use crate::infrastructure::ledger::{CommittedCommand, LedgerApi, LedgerCommand, LedgerTransaction};
use async_trait::async_trait;
use bitcoin::Txid;
use log::{debug, info, warn};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// Builds, co-signs and broadcasts the public-chain spend once consensus is
/// reached. The transaction build itself is out of scope here; the executor
/// must construct it from the agreed value only, so all notaries produce
/// byte-identical unsigned transactions.
#[async_trait]
pub trait SpendExecutor: Send + Sync {
    async fn execute(&self, details: &WithdrawalDetails, consensus: &WithdrawalConsensus) -> Result<Txid>;
}

pub struct WithdrawalCoordinator {
    ledger: Arc<dyn LedgerApi>,
    chain: Arc<dyn ChainNode>,
    peers: Arc<PeerListProvider>,
    settlement: Arc<SettlementService>,
    executor: Arc<dyn SpendExecutor>,
    notary_id: NotaryId,
    account: AccountId,
    withdrawal_account: AccountId,
    confidence_level: u64,
    /// Requests observed but not yet concluded; cleared on conclusion so
    /// memory stays bounded. The ledger copy remains as the audit trail.
    open: Mutex<HashMap<RequestId, WithdrawalDetails>>,
}

impl WithdrawalCoordinator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        ledger: Arc<dyn LedgerApi>,
        chain: Arc<dyn ChainNode>,
        peers: Arc<PeerListProvider>,
        settlement: Arc<SettlementService>,
        executor: Arc<dyn SpendExecutor>,
        notary_id: NotaryId,
        account: AccountId,
        withdrawal_account: AccountId,
        confidence_level: u64,
    ) -> Self {
        Self {
            ledger,
            chain,
            peers,
            settlement,
            executor,
            notary_id,
            account,
            withdrawal_account,
            confidence_level,
            open: Mutex::new(HashMap::new()),
        }
    }

    fn lock_open(&self) -> Result<MutexGuard<'_, HashMap<RequestId, WithdrawalDetails>>> {
        self.open
            .lock()
            .map_err(|_| BridgeError::StorageError { operation: "open requests lock".to_string(), details: "poisoned".to_string() })
    }

    /// Account collecting consensus entries for `request_id`. Ledger account
    /// names are length-limited, so only a hash prefix goes into the name;
    /// the full hash is stored as a detail.
    pub fn accumulator_account(request_id: &RequestId) -> AccountId {
        let hex = request_id.to_string();
        AccountId::new(format!("{}@{}", &hex[..ACCUMULATOR_NAME_HEX_CHARS], CONSENSUS_DOMAIN))
    }

    /// Recognizes a withdrawal request: a transfer into the withdrawal
    /// account whose description names the destination Bitcoin address. The
    /// net amount excludes the configured fee.
    pub fn observe_command(&self, committed: &CommittedCommand, asset: &AssetId) -> Option<WithdrawalDetails> {
        match &committed.command {
            LedgerCommand::TransferAsset { source, destination, asset: tx_asset, description, amount }
                if *destination == self.withdrawal_account && tx_asset == asset =>
            {
                Some(WithdrawalDetails {
                    source_account: source.clone(),
                    destination_address: description.clone(),
                    amount_sat: amount.saturating_sub(self.settlement.fee_sat()),
                    asset: tx_asset.clone(),
                    created_time_ms: committed.created_time_ms,
                })
            }
            _ => None,
        }
    }

    /// Opens the request locally and publishes this notary's consensus entry.
    pub async fn handle_request(&self, details: WithdrawalDetails) -> Result<()> {
        let request_id = details.request_id();
        audit(AuditEvent::WithdrawalObserved {
            request_id: request_id.to_string(),
            source_account: details.source_account.to_string(),
            destination_address: details.destination_address.clone(),
            amount_sat: details.amount_sat,
        });
        info!(
            "withdrawal request observed request_id={} source={} destination={} amount_sat={}",
            request_id, details.source_account, details.destination_address, details.amount_sat
        );
        self.lock_open()?.insert(request_id, details.clone());

        // Highest height whose transactions have >= confidence_level
        // confirmations in this notary's view of the chain.
        let tip = self.chain.current_height().await?;
        let available_height = tip.saturating_add(1).saturating_sub(self.confidence_level);
        let peer_count = self.peers.peer_count().await? as u32;
        let entry = ConsensusEntry { available_height, peer_count };

        let accumulator = Self::accumulator_account(&request_id);
        let quorum = self.ledger.account_quorum(&self.account).await.unwrap_or(1);
        self.ledger
            .submit(LedgerTransaction {
                creator: self.account.clone(),
                created_time_ms: now_millis(),
                quorum,
                commands: vec![
                    LedgerCommand::SetAccountDetail {
                        account: accumulator.clone(),
                        key: self.notary_id.to_string(),
                        value: serde_json::to_string(&entry)?,
                    },
                    LedgerCommand::SetAccountDetail {
                        account: accumulator.clone(),
                        key: REQUEST_HASH_KEY.to_string(),
                        value: request_id.to_string(),
                    },
                    LedgerCommand::SetAccountDetail {
                        account: accumulator.clone(),
                        key: REQUEST_DETAILS_KEY.to_string(),
                        value: serde_json::to_string(&details)?,
                    },
                ],
            })
            .await?;
        debug!(
            "consensus entry published request_id={} available_height={} peer_count={}",
            request_id, available_height, peer_count
        );

        // Best-effort backing-account creation; a peer's equivalent
        // transaction may already have landed.
        let create = self
            .ledger
            .submit(LedgerTransaction {
                creator: self.account.clone(),
                created_time_ms: now_millis(),
                quorum,
                commands: vec![LedgerCommand::CreateAccount { account: accumulator.clone() }],
            })
            .await;
        match create {
            Ok(_) => {}
            Err(err) if err.is_benign_race() => debug!("accumulator account already exists account={}", accumulator),
            Err(err) => warn!("accumulator account creation failed account={} error={}", accumulator, err),
        }

        self.try_conclude(&request_id).await?;
        Ok(())
    }

    /// Accumulator activity handler: a peer's entry landed on some consensus
    /// account; re-check the matching open request.
    pub async fn on_accumulator_activity(&self, account: &AccountId) -> Result<()> {
        let matching: Vec<RequestId> = self
            .lock_open()?
            .keys()
            .filter(|request_id| Self::accumulator_account(request_id) == *account)
            .copied()
            .collect();
        for request_id in matching {
            self.try_conclude(&request_id).await?;
        }
        Ok(())
    }

    /// Reads the accumulator and, at quorum, reduces and executes the spend.
    ///
    /// Returns the agreed value when this call concluded the request. Missing
    /// quorum is not an error; the request stays open.
    pub async fn try_conclude(&self, request_id: &RequestId) -> Result<Option<WithdrawalConsensus>> {
        let Some(details) = self.lock_open()?.get(request_id).cloned() else {
            return Ok(None);
        };

        let accumulator = Self::accumulator_account(request_id);
        let raw = self.ledger.account_details(&accumulator, None).await?;
        let mut entries = Vec::new();
        for (key, value) in &raw {
            if key == REQUEST_HASH_KEY || key == REQUEST_DETAILS_KEY {
                continue;
            }
            match serde_json::from_str::<ConsensusEntry>(value) {
                Ok(entry) => entries.push(entry),
                Err(err) => {
                    // A malformed entry fails this request's arithmetic, not
                    // the listener.
                    return Err(BridgeError::SerializationError {
                        format: "json".to_string(),
                        details: format!("consensus entry from {key} on {accumulator}: {err}"),
                    });
                }
            }
        }

        let peer_count = self.peers.peer_count().await?;
        let need = super_majority(peer_count);
        if entries.len() < need {
            debug!("quorum not reached request_id={} have={} need={}", request_id, entries.len(), need);
            return Ok(None);
        }

        let consensus = reduce_entries(entries.iter().copied())
            .ok_or_else(|| BridgeError::missing_detail(accumulator.as_str(), "consensus entries"))?;
        audit(AuditEvent::ConsensusReached {
            request_id: request_id.to_string(),
            available_height: consensus.available_height,
            peer_count: consensus.peer_count,
            entries: entries.len(),
        });
        info!(
            "consensus reached request_id={} available_height={} peer_count={} entries={}",
            request_id, consensus.available_height, consensus.peer_count, entries.len()
        );

        match self.executor.execute(&details, &consensus).await {
            Ok(btc_txid) => {
                self.settlement.finalize_withdrawal(&details, &btc_txid).await?;
            }
            Err(err) => {
                warn!("spend execution failed request_id={} error={}", request_id, err);
                self.settlement.rollback_withdrawal(&details, &err.to_string()).await?;
            }
        }

        // Conclusion reached either way; drop the working-set entry.
        self.lock_open()?.remove(request_id);
        Ok(Some(consensus))
    }

    pub fn open_request_count(&self) -> Result<usize> {
        Ok(self.lock_open()?.len())
    }
}
