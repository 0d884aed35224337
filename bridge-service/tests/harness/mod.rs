//! Multi-notary test cluster: every notary runs its full service loops over
//! one shared in-memory ledger and one shared mock chain node.

use async_trait::async_trait;
use bridge_core::application::SpendExecutor;
use bridge_core::domain::model::{WithdrawalConsensus, WithdrawalDetails};
use bridge_core::foundation::util::time::now_millis;
use bridge_core::foundation::{AccountId, AssetId, BridgeError, Result};
use bridge_core::infrastructure::chain::{MockChainNode, ObservedBlock, ObservedOutput, ObservedTransaction};
use bridge_core::infrastructure::config::BridgeConfig;
use bridge_core::infrastructure::ledger::{notary_detail_key, LedgerApi, LedgerCommand, LedgerTransaction, MemoryLedger};
use bridge_core::infrastructure::wallet::MemoryWalletStore;
use bitcoin::hashes::Hash;
use bitcoin::{BlockHash, Txid};
use bridge_service::service::{self, BridgeFlow, ServiceHandle};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

pub const ADMIN_ACCOUNT: &str = "admin@notary";

#[allow(dead_code)]
pub async fn wait_until(timeout: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if check() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
}

/// Deterministic spend stand-in: the txid depends only on the request, so
/// every notary reports the identical broadcast.
pub struct ScriptedSpendExecutor {
    calls: AtomicUsize,
    fail: AtomicBool,
}

#[allow(dead_code)]
impl ScriptedSpendExecutor {
    pub fn succeeding() -> Arc<Self> {
        Arc::new(Self { calls: AtomicUsize::new(0), fail: AtomicBool::new(false) })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self { calls: AtomicUsize::new(0), fail: AtomicBool::new(true) })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SpendExecutor for ScriptedSpendExecutor {
    async fn execute(&self, details: &WithdrawalDetails, _consensus: &WithdrawalConsensus) -> Result<Txid> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(BridgeError::SpendFailed {
                request_id: details.request_id().to_string(),
                details: "no spendable utxos".to_string(),
            });
        }
        Ok(Txid::from_str(&details.request_id().to_string()).expect("txid from request id"))
    }
}

pub struct Notary {
    pub flow: Arc<BridgeFlow>,
    pub wallet: Arc<MemoryWalletStore>,
    pub executor: Arc<ScriptedSpendExecutor>,
    _handle: ServiceHandle,
}

pub struct Cluster {
    pub ledger: Arc<MemoryLedger>,
    pub chain: Arc<MockChainNode>,
    pub notaries: Vec<Notary>,
    pub asset: AssetId,
    config_template: BridgeConfig,
}

#[allow(dead_code)]
impl Cluster {
    pub async fn start(count: usize) -> Cluster {
        Self::start_with(count, |_| ScriptedSpendExecutor::succeeding()).await
    }

    pub async fn start_with(count: usize, executor_for: impl Fn(usize) -> Arc<ScriptedSpendExecutor>) -> Cluster {
        let ledger = Arc::new(MemoryLedger::new());
        let chain = Arc::new(MockChainNode::new());
        chain.set_height(100);

        let template = notary_config(0);
        seed_genesis(&ledger, &template, count).await;

        let mut notaries = Vec::with_capacity(count);
        for index in 0..count {
            let config = notary_config(index);
            let wallet = Arc::new(MemoryWalletStore::new());
            let executor = executor_for(index);
            let flow = Arc::new(
                BridgeFlow::new(config, ledger.clone(), chain.clone(), wallet.clone(), executor.clone())
                    .expect("build flow"),
            );
            let handle = service::start(flow.clone()).await.expect("start services");
            notaries.push(Notary { flow, wallet, executor, _handle: handle });
        }

        Cluster { ledger, chain, notaries, asset: template.asset(), config_template: template }
    }

    pub fn register_client(&self, account: &str, balance_sat: u64) {
        let account = AccountId::new(account);
        self.ledger.register_account(account.clone(), 1).expect("register client");
        if balance_sat > 0 {
            self.ledger.seed_balance(&account, &self.asset, balance_sat).expect("seed client");
        }
    }

    pub fn seed_reserve(&self, balance_sat: u64) {
        let reserve = AccountId::new(self.config_template.ledger.reserve_account.clone());
        self.ledger.seed_balance(&reserve, &self.asset, balance_sat).expect("seed reserve");
    }

    /// Operator action: bind a generated deposit address to a client account.
    pub async fn register_deposit_address(&self, address: &str, client: &str) {
        self.ledger
            .submit(LedgerTransaction {
                creator: AccountId::new(ADMIN_ACCOUNT),
                created_time_ms: now_millis(),
                quorum: 1,
                commands: vec![LedgerCommand::SetAccountDetail {
                    account: AccountId::new(self.config_template.ledger.registered_address_account.clone()),
                    key: address.to_string(),
                    value: client.to_string(),
                }],
            })
            .await
            .expect("register deposit address");
    }

    /// Client action: a ledger transfer into the withdrawal account whose
    /// description names the destination Bitcoin address.
    pub async fn submit_withdrawal(&self, client: &str, destination: &str, amount_sat: u64) {
        self.ledger
            .submit(LedgerTransaction {
                creator: AccountId::new(client),
                created_time_ms: now_millis(),
                quorum: 1,
                commands: vec![LedgerCommand::TransferAsset {
                    source: AccountId::new(client),
                    destination: AccountId::new(self.config_template.ledger.withdrawal_account.clone()),
                    asset: self.asset.clone(),
                    description: destination.to_string(),
                    amount: amount_sat,
                }],
            })
            .await
            .expect("submit withdrawal");
    }

    pub fn balance(&self, account: &str) -> u64 {
        self.ledger.balance(&AccountId::new(account), &self.asset).expect("balance")
    }

    pub fn withdrawal_balance(&self) -> u64 {
        self.balance(&self.config_template.ledger.withdrawal_account)
    }

    pub fn push_deposit_block(&self, height: u64, address: &str, amount_sat: u64) -> Txid {
        let mut seed = [0u8; 32];
        seed[..8].copy_from_slice(&height.to_le_bytes());
        let txid = Txid::from_byte_array(*blake3::hash(&seed).as_bytes());
        let block = ObservedBlock {
            hash: BlockHash::from_byte_array(seed),
            height,
            time_ms: now_millis(),
            transactions: vec![ObservedTransaction {
                txid,
                outputs: vec![ObservedOutput { address: address.to_string(), amount_sat }],
            }],
        };
        self.chain.push_block(block).expect("push block");
        txid
    }
}

fn notary_config(index: usize) -> BridgeConfig {
    let mut config = BridgeConfig::default();
    config.service.notary_id = format!("notary-{index}");
    config.service.account = format!("notary_{index}@notary");
    config.chain.network = "regtest".to_string();
    config.chain.confidence_level = 3;
    config.keygen.sweep_interval_secs = 1;
    config.withdrawal.fee_sat = 0;
    config.api.enabled = false;
    config
}

async fn seed_genesis(ledger: &MemoryLedger, template: &BridgeConfig, count: usize) {
    let accounts = [
        template.ledger.trigger_account.as_str(),
        template.ledger.peers_account.as_str(),
        template.ledger.free_address_account.as_str(),
        template.ledger.change_address_account.as_str(),
        template.ledger.registered_address_account.as_str(),
        template.ledger.withdrawal_account.as_str(),
        template.ledger.billing_account.as_str(),
        template.ledger.reserve_account.as_str(),
        ADMIN_ACCOUNT,
    ];
    for account in accounts {
        ledger.register_account(AccountId::new(account), 1).expect("register account");
    }

    let mut commands = Vec::with_capacity(count);
    for index in 0..count {
        let config = notary_config(index);
        ledger.register_account(config.account(), 1).expect("register notary");
        commands.push(LedgerCommand::SetAccountDetail {
            account: AccountId::new(template.ledger.peers_account.clone()),
            key: notary_detail_key(&config.notary_id()),
            value: config.account().to_string(),
        });
    }
    ledger
        .submit(LedgerTransaction { creator: AccountId::new(ADMIN_ACCOUNT), created_time_ms: now_millis(), quorum: 1, commands })
        .await
        .expect("register peers");
}
