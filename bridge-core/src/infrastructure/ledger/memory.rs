//! In-memory ledger used by integration tests and devnet mode.
//!
//! Models exactly the slice of permissioned-ledger behavior the bridge
//! depends on: atomic transactions over the four-command vocabulary, a
//! createdTime freshness window, signatory-quorum checks, writer-scoped
//! account details and an ordered committed-block stream fanned out to all
//! subscribers. One instance is shared by every notary in a test cluster.
//!
//! Multi-signatory aggregation is modeled by transaction hash: when several
//! notaries build the byte-identical transaction (same creator, createdTime
//! and commands), only the first submission applies; the rest resolve to the
//! same committed hash. Signature collection itself is considered satisfied.

use crate::foundation::util::time::now_millis;
use crate::foundation::{AccountId, AssetId, BridgeError, LedgerTxHash, Result, LEDGER_FRESHNESS_WINDOW_MS};
use crate::infrastructure::ledger::{
    CommittedCommand, LedgerApi, LedgerBlock, LedgerBlockSubscription, LedgerCommand, LedgerTransaction,
};
use async_trait::async_trait;
use log::{debug, trace};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};
use tokio::sync::mpsc;

#[derive(Default)]
struct AccountState {
    quorum: u32,
    /// writer account → detail key → value.
    details: BTreeMap<AccountId, BTreeMap<String, String>>,
    balances: HashMap<AssetId, u64>,
}

struct LedgerInner {
    accounts: HashMap<AccountId, AccountState>,
    committed: HashSet<LedgerTxHash>,
    height: u64,
    subscribers: Vec<mpsc::UnboundedSender<LedgerBlock>>,
}

pub struct MemoryLedger {
    inner: Mutex<LedgerInner>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(LedgerInner {
                accounts: HashMap::new(),
                committed: HashSet::new(),
                height: 0,
                subscribers: Vec::new(),
            }),
        }
    }

    fn lock_inner(&self) -> Result<MutexGuard<'_, LedgerInner>> {
        self.inner
            .lock()
            .map_err(|_| BridgeError::StorageError { operation: "memory ledger lock".to_string(), details: "poisoned".to_string() })
    }

    /// Registers an account outside the transaction path (genesis setup).
    pub fn register_account(&self, account: AccountId, quorum: u32) -> Result<()> {
        let mut inner = self.lock_inner()?;
        inner.accounts.entry(account).or_default().quorum = quorum.max(1);
        Ok(())
    }

    /// Changes an account's signatory quorum, as an out-of-band signatory
    /// addition/removal would. Makes in-flight transactions stale.
    pub fn set_account_quorum(&self, account: &AccountId, quorum: u32) -> Result<()> {
        let mut inner = self.lock_inner()?;
        let state = inner
            .accounts
            .get_mut(account)
            .ok_or_else(|| BridgeError::not_found("account", account.as_str()))?;
        state.quorum = quorum.max(1);
        Ok(())
    }

    /// Credits an asset balance directly (genesis funding).
    pub fn seed_balance(&self, account: &AccountId, asset: &AssetId, amount: u64) -> Result<()> {
        let mut inner = self.lock_inner()?;
        let state = inner.accounts.entry(account.clone()).or_default();
        let balance = state.balances.entry(asset.clone()).or_insert(0);
        *balance = balance.saturating_add(amount);
        Ok(())
    }

    pub fn balance(&self, account: &AccountId, asset: &AssetId) -> Result<u64> {
        let inner = self.lock_inner()?;
        Ok(inner.accounts.get(account).and_then(|state| state.balances.get(asset)).copied().unwrap_or(0))
    }

    pub fn block_height(&self) -> Result<u64> {
        Ok(self.lock_inner()?.height)
    }

    fn validate(inner: &LedgerInner, tx: &LedgerTransaction) -> Result<()> {
        let now = now_millis();
        let lower = now.saturating_sub(LEDGER_FRESHNESS_WINDOW_MS);
        let upper = now.saturating_add(LEDGER_FRESHNESS_WINDOW_MS);
        if tx.created_time_ms < lower || tx.created_time_ms > upper {
            return Err(BridgeError::LedgerRejected {
                command: "transaction".to_string(),
                details: format!("createdTime {} outside freshness window [{}, {}]", tx.created_time_ms, lower, upper),
            });
        }

        let required = inner.accounts.get(&tx.creator).map(|state| state.quorum).unwrap_or(1);
        if tx.quorum != required {
            return Err(BridgeError::StaleQuorum { account: tx.creator.to_string(), submitted: tx.quorum, required });
        }

        for command in &tx.commands {
            match command {
                LedgerCommand::CreateAccount { account } => {
                    if inner.accounts.contains_key(account) {
                        return Err(BridgeError::already_exists("account", account.as_str()));
                    }
                }
                LedgerCommand::SetAccountDetail { .. } => {}
                LedgerCommand::TransferAsset { source, asset, amount, .. } => {
                    let available =
                        inner.accounts.get(source).and_then(|state| state.balances.get(asset)).copied().unwrap_or(0);
                    if available < *amount {
                        return Err(BridgeError::LedgerRejected {
                            command: "TransferAsset".to_string(),
                            details: format!("insufficient balance on {}: have {} need {}", source, available, amount),
                        });
                    }
                }
                LedgerCommand::SubtractAssetQuantity { account, asset, amount } => {
                    let available =
                        inner.accounts.get(account).and_then(|state| state.balances.get(asset)).copied().unwrap_or(0);
                    if available < *amount {
                        return Err(BridgeError::LedgerRejected {
                            command: "SubtractAssetQuantity".to_string(),
                            details: format!("insufficient balance on {}: have {} need {}", account, available, amount),
                        });
                    }
                }
            }
        }
        Ok(())
    }

    fn apply(inner: &mut LedgerInner, tx: &LedgerTransaction) {
        for command in &tx.commands {
            match command {
                LedgerCommand::CreateAccount { account } => {
                    inner.accounts.entry(account.clone()).or_default().quorum = 1;
                }
                LedgerCommand::SetAccountDetail { account, key, value } => {
                    // Detail writes create the target implicitly; identical
                    // rewrites collapse into the same entry.
                    let state = inner.accounts.entry(account.clone()).or_default();
                    if state.quorum == 0 {
                        state.quorum = 1;
                    }
                    state.details.entry(tx.creator.clone()).or_default().insert(key.clone(), value.clone());
                }
                LedgerCommand::TransferAsset { source, destination, asset, amount, .. } => {
                    if let Some(state) = inner.accounts.get_mut(source) {
                        if let Some(balance) = state.balances.get_mut(asset) {
                            *balance -= amount;
                        }
                    }
                    let destination_state = inner.accounts.entry(destination.clone()).or_default();
                    let balance = destination_state.balances.entry(asset.clone()).or_insert(0);
                    *balance = balance.saturating_add(*amount);
                }
                LedgerCommand::SubtractAssetQuantity { account, asset, amount } => {
                    if let Some(state) = inner.accounts.get_mut(account) {
                        if let Some(balance) = state.balances.get_mut(asset) {
                            *balance -= amount;
                        }
                    }
                }
            }
        }
    }
}

impl Default for MemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LedgerApi for MemoryLedger {
    async fn submit(&self, tx: LedgerTransaction) -> Result<LedgerTxHash> {
        let hash = tx.hash();
        let mut inner = self.lock_inner()?;
        if inner.committed.contains(&hash) {
            // Another signatory already carried the identical transaction.
            debug!("absorbing duplicate submission of committed transaction hash={}", hash);
            return Ok(hash);
        }
        Self::validate(&inner, &tx)?;
        Self::apply(&mut inner, &tx);
        inner.committed.insert(hash);

        inner.height += 1;
        let block = LedgerBlock {
            height: inner.height,
            created_at_ms: tx.created_time_ms,
            commands: tx
                .commands
                .iter()
                .map(|command| CommittedCommand {
                    creator: tx.creator.clone(),
                    created_time_ms: tx.created_time_ms,
                    command: command.clone(),
                })
                .collect(),
        };
        trace!("ledger block committed height={} commands={}", block.height, block.commands.len());
        // Drop subscribers whose receiving side went away.
        inner.subscribers.retain(|sender| sender.send(block.clone()).is_ok());

        Ok(hash)
    }

    async fn account_details(&self, account: &AccountId, writer: Option<&AccountId>) -> Result<BTreeMap<String, String>> {
        let inner = self.lock_inner()?;
        let Some(state) = inner.accounts.get(account) else {
            return Ok(BTreeMap::new());
        };
        let mut merged = BTreeMap::new();
        match writer {
            Some(writer) => {
                if let Some(details) = state.details.get(writer) {
                    merged.extend(details.clone());
                }
            }
            None => {
                for details in state.details.values() {
                    merged.extend(details.clone());
                }
            }
        }
        Ok(merged)
    }

    async fn account_quorum(&self, account: &AccountId) -> Result<u32> {
        let inner = self.lock_inner()?;
        inner
            .accounts
            .get(account)
            .map(|state| state.quorum)
            .ok_or_else(|| BridgeError::not_found("account", account.as_str()))
    }

    async fn subscribe_blocks(&self) -> Result<LedgerBlockSubscription> {
        let (sender, receiver) = mpsc::unbounded_channel();
        let mut inner = self.lock_inner()?;
        inner.subscribers.push(sender);
        debug!("ledger block subscription attached subscribers={}", inner.subscribers.len());
        Ok(LedgerBlockSubscription::new(receiver))
    }
}
