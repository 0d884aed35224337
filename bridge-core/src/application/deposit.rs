//! Deposit detection and crediting.
//!
//! One instance per process consumes the chain event stream: blocks go
//! through staleness and duplicate filters, transactions paying watched
//! addresses become deposit candidates, and the confirmation tracker decides
//! when a candidate is final. Finality triggers exactly one ledger credit.

use crate::domain::confirmation::ConfirmationTracker;
use crate::domain::deposit::ProcessedBlocks;
use crate::domain::model::DepositCandidate;
use crate::foundation::util::time::{is_older_than, now_millis};
use crate::foundation::{AccountId, AssetId, BridgeError, Result};
use crate::infrastructure::audit::{audit, AuditEvent};
use crate::infrastructure::chain::{depth_at, ChainNode, ObservedBlock};
use crate::infrastructure::ledger::{LedgerApi, LedgerCommand, LedgerTransaction};
use crate::infrastructure::wallet::WalletStore;
use bitcoin::Txid;
use log::{debug, info, warn};
use std::sync::{Arc, Mutex, MutexGuard};

pub struct DepositService {
    ledger: Arc<dyn LedgerApi>,
    wallet: Arc<dyn WalletStore>,
    tracker: ConfirmationTracker,
    processed: Mutex<ProcessedBlocks>,
    registered_address_account: AccountId,
    reserve_account: AccountId,
    asset: AssetId,
    stale_window_ms: u64,
}

impl DepositService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        ledger: Arc<dyn LedgerApi>,
        wallet: Arc<dyn WalletStore>,
        registered_address_account: AccountId,
        reserve_account: AccountId,
        asset: AssetId,
        confidence_level: u64,
        processed_block_capacity: usize,
        stale_window_ms: u64,
    ) -> Self {
        Self {
            ledger,
            wallet,
            tracker: ConfirmationTracker::new(confidence_level),
            processed: Mutex::new(ProcessedBlocks::new(processed_block_capacity)),
            registered_address_account,
            reserve_account,
            asset,
            stale_window_ms,
        }
    }

    fn lock_processed(&self) -> Result<MutexGuard<'_, ProcessedBlocks>> {
        self.processed
            .lock()
            .map_err(|_| BridgeError::StorageError { operation: "processed blocks lock".to_string(), details: "poisoned".to_string() })
    }

    pub fn tracker(&self) -> &ConfirmationTracker {
        &self.tracker
    }

    pub fn processed_block_count(&self) -> Result<usize> {
        Ok(self.lock_processed()?.len())
    }

    /// Handles one downloaded block at chain tip `tip`. Returns the number of
    /// new candidates taken into tracking.
    pub async fn on_block(&self, block: &ObservedBlock, tip: u64) -> Result<usize> {
        // Ledger-side time validation rejects stale createdTimes, so a credit
        // built from an old block could never commit. Known limitation.
        if is_older_than(block.time_ms, self.stale_window_ms, now_millis()) {
            warn!("dropping stale block hash={} height={} block_time_ms={}", block.hash, block.height, block.time_ms);
            return Ok(0);
        }
        if !self.lock_processed()?.insert(block.hash) {
            // The peer stack redelivers blocks it already announced.
            info!("dropping duplicate block hash={} height={}", block.hash, block.height);
            return Ok(0);
        }

        let depth = depth_at(tip, block.height);
        let mut taken = 0;
        for tx in &block.transactions {
            for output in &tx.outputs {
                if !self.wallet.is_watched(&output.address)? {
                    continue;
                }
                let amount_sat: u64 = tx
                    .outputs
                    .iter()
                    .filter(|other| other.address == output.address)
                    .map(|other| other.amount_sat)
                    .sum();
                let candidate = DepositCandidate {
                    txid: tx.txid,
                    block_hash: block.hash,
                    block_time_ms: block.time_ms,
                    address: output.address.clone(),
                    amount_sat,
                    seen_at_ms: now_millis(),
                };
                audit(AuditEvent::DepositObserved {
                    txid: candidate.txid.to_string(),
                    address: candidate.address.clone(),
                    amount_sat: candidate.amount_sat,
                    depth,
                });
                taken += 1;
                match self.tracker.observe(candidate.clone(), depth)? {
                    Some(final_candidate) => self.credit(&final_candidate).await?,
                    None => {
                        self.wallet.upsert_unconfirmed(candidate.clone(), depth)?;
                        debug!("deposit waiting txid={} depth={} level={}", candidate.txid, depth, self.tracker.confidence_level());
                    }
                }
                // One candidate per (tx, address) pair.
                break;
            }
        }
        Ok(taken)
    }

    /// Confidence-change handler; fires the credit at most once per txid no
    /// matter how often the event is replayed.
    pub async fn on_confidence_changed(&self, txid: &Txid, depth: u64) -> Result<()> {
        match self.tracker.on_depth_change(txid, depth)? {
            Some(candidate) => self.credit(&candidate).await,
            None => {
                if let Some(candidate) = self.tracker.waiting_candidate(txid)? {
                    self.wallet.upsert_unconfirmed(candidate, depth)?;
                }
                Ok(())
            }
        }
    }

    /// Submits the ledger credit for a final deposit.
    ///
    /// The transaction is a deterministic function of the candidate: creator
    /// is the shared reserve account and createdTime is the block timestamp,
    /// so every notary builds the identical transaction and the ledger
    /// aggregates their signatures into one commit.
    ///
    /// Unregistered addresses are logged and skipped with enough context to
    /// replay the credit manually; nothing is silently dropped.
    async fn credit(&self, candidate: &DepositCandidate) -> Result<()> {
        let registry = self.ledger.account_details(&self.registered_address_account, None).await?;
        let Some(client_account) = registry.get(&candidate.address) else {
            warn!(
                "deposit final but address unregistered txid={} address={} amount_sat={}",
                candidate.txid, candidate.address, candidate.amount_sat
            );
            audit(AuditEvent::DepositSkipped {
                txid: candidate.txid.to_string(),
                address: candidate.address.clone(),
                reason: "address not registered to a client account".to_string(),
            });
            self.wallet.remove_unconfirmed(&candidate.txid)?;
            return Ok(());
        };

        let quorum = self.ledger.account_quorum(&self.reserve_account).await.unwrap_or(1);
        let ledger_tx = self
            .ledger
            .submit(LedgerTransaction {
                creator: self.reserve_account.clone(),
                created_time_ms: candidate.block_time_ms,
                quorum,
                commands: vec![LedgerCommand::TransferAsset {
                    source: self.reserve_account.clone(),
                    destination: AccountId::new(client_account.clone()),
                    asset: self.asset.clone(),
                    description: candidate.txid.to_string(),
                    amount: candidate.amount_sat,
                }],
            })
            .await?;

        self.wallet.remove_unconfirmed(&candidate.txid)?;
        self.tracker.forget(&candidate.txid)?;
        audit(AuditEvent::DepositCredited {
            txid: candidate.txid.to_string(),
            client_account: client_account.clone(),
            amount_sat: candidate.amount_sat,
            ledger_tx: ledger_tx.to_string(),
        });
        info!(
            "deposit credited txid={} client={} amount_sat={} ledger_tx={}",
            candidate.txid, client_account, candidate.amount_sat, ledger_tx
        );
        Ok(())
    }

    /// Restart recovery: re-register a Waiting tracker for every persisted
    /// unconfirmed deposit still below the confidence level. Entries at or
    /// past the level are presumed credited before the crash and dropped with
    /// a log line (the crash-between-confidence-and-credit gap).
    pub async fn recover(&self, node: &dyn ChainNode) -> Result<usize> {
        let level = self.tracker.confidence_level();
        let mut restored = 0;
        for entry in self.wallet.unconfirmed_deposits()? {
            let txid = entry.candidate.txid;
            if entry.depth >= level {
                warn!(
                    "recovery skipping deposit at or past confidence, presumed credited txid={} depth={} level={}",
                    txid, entry.depth, level
                );
                self.wallet.remove_unconfirmed(&txid)?;
                continue;
            }
            match node.block_by_hash(&entry.candidate.block_hash).await? {
                Some(block) => {
                    debug!("recovery re-anchored deposit txid={} block={} height={}", txid, block.hash, block.height);
                }
                None => {
                    warn!("recovery could not find containing block txid={} block_hash={}", txid, entry.candidate.block_hash);
                }
            }
            self.tracker.reattach(entry.candidate, entry.depth)?;
            restored += 1;
            info!("recovery re-registered confirmation tracker txid={} depth={}", txid, entry.depth);
        }
        Ok(restored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::confirmation::TrackState;
    use crate::domain::model::{AddressKind, AddressRecord, WatchedAddress};
    use crate::foundation::SessionId;
    use crate::infrastructure::chain::{MockChainNode, ObservedOutput, ObservedTransaction};
    use crate::infrastructure::ledger::MemoryLedger;
    use crate::infrastructure::wallet::{MemoryWalletStore, UnconfirmedDeposit, WalletData, WalletStore};
    use std::str::FromStr;

    const ADDRESS: &str = "2N3oefVeg6stiTb5Kh3ozCSkaqmx91FDbsm";

    fn watched() -> WatchedAddress {
        WatchedAddress {
            record: AddressRecord {
                address: ADDRESS.to_string(),
                kind: AddressKind::Free,
                public_keys: vec!["02aa".to_string()],
                threshold: 1,
                redeem_script: "51".to_string(),
            },
            session: SessionId::new("free_01@btcSession"),
            generated_at_ms: now_millis(),
        }
    }

    fn block(n: u8, height: u64, txs: Vec<ObservedTransaction>) -> ObservedBlock {
        ObservedBlock {
            hash: bitcoin::BlockHash::from_str(&hex::encode([n; 32])).expect("hash"),
            height,
            time_ms: now_millis(),
            transactions: txs,
        }
    }

    fn paying_tx(n: u8, amount_sat: u64) -> ObservedTransaction {
        ObservedTransaction {
            txid: Txid::from_str(&hex::encode([n; 32])).expect("txid"),
            outputs: vec![ObservedOutput { address: ADDRESS.to_string(), amount_sat }],
        }
    }

    fn setup(confidence_level: u64) -> (Arc<MemoryLedger>, Arc<MemoryWalletStore>, DepositService) {
        let ledger = Arc::new(MemoryLedger::new());
        let wallet = Arc::new(MemoryWalletStore::new());
        wallet.add_watched_address(watched()).expect("watch");

        let account = AccountId::new("notary_a@notary");
        let reserve = AccountId::new("btc_reserve@notary");
        let asset = AssetId::new("btc#bitcoin");
        ledger.register_account(account.clone(), 1).expect("register notary");
        ledger.register_account(reserve.clone(), 1).expect("register reserve");
        ledger.register_account(AccountId::new("client@notary"), 1).expect("register client");
        ledger.seed_balance(&reserve, &asset, 1_000_000_000).expect("seed");

        let service = DepositService::new(
            ledger.clone(),
            wallet.clone(),
            AccountId::new("btc_registered_addresses@notary"),
            reserve,
            asset,
            confidence_level,
            1024,
            crate::foundation::STALE_BLOCK_WINDOW_MS,
        );
        (ledger, wallet, service)
    }

    async fn register_address(ledger: &MemoryLedger) {
        ledger
            .submit(LedgerTransaction {
                creator: AccountId::new("notary_a@notary"),
                created_time_ms: now_millis(),
                quorum: 1,
                commands: vec![LedgerCommand::SetAccountDetail {
                    account: AccountId::new("btc_registered_addresses@notary"),
                    key: ADDRESS.to_string(),
                    value: "client@notary".to_string(),
                }],
            })
            .await
            .expect("register address");
    }

    #[tokio::test]
    async fn deposit_waits_then_credits_once_at_confidence() {
        let (ledger, wallet, service) = setup(6);
        register_address(&ledger).await;
        let asset = AssetId::new("btc#bitcoin");

        // Arrives at depth 3 (tip 102, block height 100).
        let tx = paying_tx(1, 50_000_000);
        let txid = tx.txid;
        let taken = service.on_block(&block(1, 100, vec![tx]), 102).await.expect("on_block");
        assert_eq!(taken, 1);
        assert_eq!(service.tracker().state(&txid).expect("state"), Some(TrackState::Waiting { depth: 3 }));
        assert_eq!(ledger.balance(&AccountId::new("client@notary"), &asset).expect("balance"), 0);

        service.on_confidence_changed(&txid, 6).await.expect("depth 6");
        assert_eq!(ledger.balance(&AccountId::new("client@notary"), &asset).expect("balance"), 50_000_000);
        assert!(wallet.unconfirmed_deposits().expect("unconfirmed").is_empty());

        // The duplicate event the upstream stack is known to produce.
        service.on_confidence_changed(&txid, 6).await.expect("duplicate depth 6");
        assert_eq!(ledger.balance(&AccountId::new("client@notary"), &asset).expect("balance"), 50_000_000);
    }

    #[tokio::test]
    async fn duplicate_block_produces_no_new_candidates() {
        let (ledger, _wallet, service) = setup(6);
        register_address(&ledger).await;

        let b = block(2, 100, vec![paying_tx(2, 1_000)]);
        assert_eq!(service.on_block(&b, 100).await.expect("first"), 1);
        assert_eq!(service.on_block(&b, 101).await.expect("duplicate"), 0);
        assert_eq!(service.processed_block_count().expect("count"), 1);
    }

    #[tokio::test]
    async fn stale_block_is_dropped() {
        let (_ledger, wallet, service) = setup(6);
        let mut b = block(3, 100, vec![paying_tx(3, 1_000)]);
        b.time_ms = now_millis().saturating_sub(crate::foundation::STALE_BLOCK_WINDOW_MS + 60_000);
        assert_eq!(service.on_block(&b, 100).await.expect("stale"), 0);
        assert!(wallet.unconfirmed_deposits().expect("unconfirmed").is_empty());
        // Stale blocks do not even enter the dedup set.
        assert_eq!(service.processed_block_count().expect("count"), 0);
    }

    #[tokio::test]
    async fn already_deep_deposit_credits_immediately() {
        let (ledger, _wallet, service) = setup(6);
        register_address(&ledger).await;

        let tx = paying_tx(4, 7_000);
        service.on_block(&block(4, 100, vec![tx]), 110).await.expect("deep block");
        assert_eq!(
            ledger.balance(&AccountId::new("client@notary"), &AssetId::new("btc#bitcoin")).expect("balance"),
            7_000
        );
    }

    #[tokio::test]
    async fn unregistered_address_is_skipped_not_dropped_silently() {
        let (ledger, _wallet, service) = setup(1);
        // No registry entry for ADDRESS.
        service.on_block(&block(5, 100, vec![paying_tx(5, 9_000)]), 100).await.expect("on_block");
        assert_eq!(ledger.balance(&AccountId::new("client@notary"), &AssetId::new("btc#bitcoin")).expect("balance"), 0);
    }

    #[tokio::test]
    async fn recovery_restores_waiting_without_firing() {
        let ledger = Arc::new(MemoryLedger::new());
        let candidate = DepositCandidate {
            txid: Txid::from_str(&hex::encode([6; 32])).expect("txid"),
            block_hash: bitcoin::BlockHash::from_str(&hex::encode([7; 32])).expect("hash"),
            block_time_ms: now_millis(),
            address: ADDRESS.to_string(),
            amount_sat: 123,
            seen_at_ms: now_millis(),
        };
        let wallet = Arc::new(MemoryWalletStore::with_data(WalletData {
            watched_addresses: vec![watched()],
            session_keys: vec![],
            unconfirmed: vec![UnconfirmedDeposit { candidate: candidate.clone(), depth: 2 }],
        }));
        let service = DepositService::new(
            ledger,
            wallet.clone(),
            AccountId::new("btc_registered_addresses@notary"),
            AccountId::new("btc_reserve@notary"),
            AssetId::new("btc#bitcoin"),
            6,
            1024,
            crate::foundation::STALE_BLOCK_WINDOW_MS,
        );

        let node = MockChainNode::new();
        let restored = service.recover(&node).await.expect("recover");
        assert_eq!(restored, 1);
        assert_eq!(service.tracker().state(&candidate.txid).expect("state"), Some(TrackState::Waiting { depth: 2 }));
        assert_eq!(service.tracker().waiting_count().expect("waiting"), 1);
    }

    #[tokio::test]
    async fn recovery_drops_entries_past_confidence() {
        let candidate = DepositCandidate {
            txid: Txid::from_str(&hex::encode([8; 32])).expect("txid"),
            block_hash: bitcoin::BlockHash::from_str(&hex::encode([9; 32])).expect("hash"),
            block_time_ms: now_millis(),
            address: ADDRESS.to_string(),
            amount_sat: 55,
            seen_at_ms: now_millis(),
        };
        let wallet = Arc::new(MemoryWalletStore::with_data(WalletData {
            watched_addresses: vec![],
            session_keys: vec![],
            unconfirmed: vec![UnconfirmedDeposit { candidate: candidate.clone(), depth: 6 }],
        }));
        let service = DepositService::new(
            Arc::new(MemoryLedger::new()),
            wallet.clone(),
            AccountId::new("btc_registered_addresses@notary"),
            AccountId::new("btc_reserve@notary"),
            AssetId::new("btc#bitcoin"),
            6,
            1024,
            crate::foundation::STALE_BLOCK_WINDOW_MS,
        );

        let restored = service.recover(&MockChainNode::new()).await.expect("recover");
        assert_eq!(restored, 0);
        assert!(wallet.unconfirmed_deposits().expect("unconfirmed").is_empty());
        assert!(service.tracker().state(&candidate.txid).expect("state").is_none());
    }
}
