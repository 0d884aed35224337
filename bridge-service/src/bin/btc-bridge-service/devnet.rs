//! Single-process development stack: in-memory ledger, mock chain node and a
//! seeded genesis, so the full flow can be exercised without external
//! infrastructure.

use async_trait::async_trait;
use bridge_core::application::SpendExecutor;
use bridge_core::domain::model::{AddressKind, WithdrawalConsensus, WithdrawalDetails};
use bridge_core::foundation::util::time::now_millis;
use bridge_core::foundation::{AccountId, Result};
use bridge_core::infrastructure::chain::{ChainNode, MockChainNode};
use bridge_core::infrastructure::config::BridgeConfig;
use bridge_core::infrastructure::ledger::{notary_detail_key, LedgerApi, LedgerCommand, LedgerTransaction, MemoryLedger};
use bridge_core::infrastructure::wallet::FileWalletStore;
use bridge_service::api::{run_api_server, ApiState};
use bridge_service::service::{self, BridgeFlow};
use log::{info, warn};
use std::sync::Arc;

const DEVNET_CLIENT_ACCOUNT: &str = "client@notary";
const DEVNET_CLIENT_BALANCE_SAT: u64 = 100_000_000;
const DEVNET_START_HEIGHT: u64 = 800_000;

/// Spends by handing a synthetic raw transaction to the chain node. The
/// payload is a deterministic function of the request, so every notary
/// broadcasts the identical bytes.
struct DevnetSpendExecutor {
    chain: Arc<MockChainNode>,
}

#[async_trait]
impl SpendExecutor for DevnetSpendExecutor {
    async fn execute(&self, details: &WithdrawalDetails, consensus: &WithdrawalConsensus) -> Result<bitcoin::Txid> {
        let payload = format!(
            "devnet-spend:{}:{}:{}:{}",
            details.request_id(),
            details.destination_address,
            details.amount_sat,
            consensus.available_height
        );
        self.chain.broadcast(&hex::encode(payload)).await
    }
}

pub async fn run(config: BridgeConfig) -> Result<()> {
    let ledger = Arc::new(MemoryLedger::new());
    let chain = Arc::new(MockChainNode::new());
    chain.set_height(DEVNET_START_HEIGHT);

    seed_genesis(&ledger, &config).await?;

    let wallet = Arc::new(FileWalletStore::open(config.wallet_file())?);
    let executor = Arc::new(DevnetSpendExecutor { chain: chain.clone() });
    let flow = Arc::new(BridgeFlow::new(config, ledger, chain, wallet, executor)?);

    let _handle = service::start(flow.clone()).await?;

    if flow.config().api.enabled {
        let addr = flow.config().api.addr.parse().map_err(|err| {
            bridge_core::foundation::BridgeError::ConfigError(format!("bad api.addr: {err}"))
        })?;
        let state = Arc::new(ApiState::new(flow.clone()));
        tokio::spawn(async move {
            if let Err(err) = run_api_server(addr, state).await {
                warn!("operator api exited error={}", err);
            }
        });
    }

    // Kick off one generation round so a fresh devnet has an address to
    // deposit to.
    let session = flow.request_address(AddressKind::Free).await?;
    info!("devnet ready, address generation requested session={}", session);

    tokio::signal::ctrl_c().await?;
    info!("shutdown requested");
    Ok(())
}

/// Registers the well-known accounts, the demo client and this notary's peer
/// entry.
async fn seed_genesis(ledger: &MemoryLedger, config: &BridgeConfig) -> Result<()> {
    let notary_account = config.account();
    let accounts = [
        config.ledger.trigger_account.as_str(),
        config.ledger.peers_account.as_str(),
        config.ledger.free_address_account.as_str(),
        config.ledger.change_address_account.as_str(),
        config.ledger.registered_address_account.as_str(),
        config.ledger.withdrawal_account.as_str(),
        config.ledger.billing_account.as_str(),
        config.ledger.reserve_account.as_str(),
        DEVNET_CLIENT_ACCOUNT,
    ];
    for account in accounts {
        ledger.register_account(AccountId::new(account), 1)?;
    }
    ledger.register_account(notary_account.clone(), 1)?;

    let asset = config.asset();
    ledger.seed_balance(&AccountId::new(DEVNET_CLIENT_ACCOUNT), &asset, DEVNET_CLIENT_BALANCE_SAT)?;

    ledger
        .submit(LedgerTransaction {
            creator: notary_account.clone(),
            created_time_ms: now_millis(),
            quorum: 1,
            commands: vec![LedgerCommand::SetAccountDetail {
                account: AccountId::new(config.ledger.peers_account.clone()),
                key: notary_detail_key(&config.notary_id()),
                value: notary_account.to_string(),
            }],
        })
        .await?;

    info!("devnet genesis seeded client={} balance_sat={}", DEVNET_CLIENT_ACCOUNT, DEVNET_CLIENT_BALANCE_SAT);
    Ok(())
}
