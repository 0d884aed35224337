//! One notary's fully-wired bridge: the application services of
//! `bridge-core` assembled over concrete ledger, chain and wallet
//! implementations, plus the matchers the event loops dispatch on.

use bridge_core::application::{
    DepositService, KeyExchangeService, PeerListProvider, SettlementService, SpendExecutor, WithdrawalCoordinator,
};
use bridge_core::domain::model::AddressKind;
use bridge_core::foundation::{AccountId, AssetId, Result, SessionId, CONSENSUS_DOMAIN, SESSION_DOMAIN};
use bridge_core::infrastructure::chain::ChainNode;
use bridge_core::infrastructure::config::BridgeConfig;
use bridge_core::infrastructure::health::HealthMonitor;
use bridge_core::infrastructure::ledger::{LedgerApi, SuffixWatcher, Topic};
use bridge_core::infrastructure::wallet::WalletStore;
use serde::Serialize;
use std::sync::Arc;

/// Counters exposed on the `/stats` endpoint.
#[derive(Clone, Copy, Debug, Serialize)]
pub struct BridgeStats {
    pub watched_addresses: usize,
    pub pending_deposits: usize,
    pub processed_blocks: usize,
    pub open_sessions: usize,
    pub open_withdrawals: usize,
}

pub struct BridgeFlow {
    config: BridgeConfig,
    ledger: Arc<dyn LedgerApi>,
    chain: Arc<dyn ChainNode>,
    wallet: Arc<dyn WalletStore>,
    peers: Arc<PeerListProvider>,
    keygen: Arc<KeyExchangeService>,
    deposits: Arc<DepositService>,
    withdrawals: Arc<WithdrawalCoordinator>,
    trigger: Topic,
    session_watcher: SuffixWatcher,
    accumulator_watcher: SuffixWatcher,
    health: Arc<HealthMonitor>,
    asset: AssetId,
}

impl BridgeFlow {
    pub fn new(
        config: BridgeConfig,
        ledger: Arc<dyn LedgerApi>,
        chain: Arc<dyn ChainNode>,
        wallet: Arc<dyn WalletStore>,
        executor: Arc<dyn SpendExecutor>,
    ) -> Result<Self> {
        let network = config.network()?;
        let asset = config.asset();

        let peers = Arc::new(PeerListProvider::new(ledger.clone(), AccountId::new(config.ledger.peers_account.clone())));
        let keygen = Arc::new(KeyExchangeService::new(
            ledger.clone(),
            wallet.clone(),
            config.notary_id(),
            config.account(),
            network,
            AccountId::new(config.ledger.free_address_account.clone()),
            AccountId::new(config.ledger.change_address_account.clone()),
            config.keygen.finalize_policy,
            config.keygen.session_finalize_timeout_secs,
        ));
        let deposits = Arc::new(DepositService::new(
            ledger.clone(),
            wallet.clone(),
            AccountId::new(config.ledger.registered_address_account.clone()),
            AccountId::new(config.ledger.reserve_account.clone()),
            asset.clone(),
            config.chain.confidence_level,
            config.chain.processed_block_capacity,
            config.chain.stale_block_window_ms,
        ));
        let settlement = Arc::new(SettlementService::new(
            ledger.clone(),
            AccountId::new(config.ledger.withdrawal_account.clone()),
            AccountId::new(config.ledger.billing_account.clone()),
            asset.clone(),
            config.withdrawal.fee_sat,
            config.ledger.quorum_retry_attempts,
        ));
        let withdrawals = Arc::new(WithdrawalCoordinator::new(
            ledger.clone(),
            chain.clone(),
            peers.clone(),
            settlement,
            executor,
            config.notary_id(),
            config.account(),
            AccountId::new(config.ledger.withdrawal_account.clone()),
            config.chain.confidence_level,
        ));

        Ok(Self {
            trigger: Topic::new(AccountId::new(config.ledger.trigger_account.clone())),
            session_watcher: SuffixWatcher::new(format!("@{SESSION_DOMAIN}")),
            accumulator_watcher: SuffixWatcher::new(format!("@{CONSENSUS_DOMAIN}")),
            health: Arc::new(HealthMonitor::new()),
            config,
            ledger,
            chain,
            wallet,
            peers,
            keygen,
            deposits,
            withdrawals,
            asset,
        })
    }

    /// Asks the whole notary set for a new address of `kind`.
    pub async fn request_address(&self, kind: AddressKind) -> Result<SessionId> {
        self.keygen.publish_generation_request(&self.trigger, kind).await
    }

    pub fn stats(&self) -> Result<BridgeStats> {
        Ok(BridgeStats {
            watched_addresses: self.wallet.watched_addresses()?.len(),
            pending_deposits: self.deposits.tracker().waiting_count()?,
            processed_blocks: self.deposits.processed_block_count()?,
            open_sessions: self.keygen.open_session_count()?,
            open_withdrawals: self.withdrawals.open_request_count()?,
        })
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn ledger(&self) -> &Arc<dyn LedgerApi> {
        &self.ledger
    }

    pub fn chain(&self) -> &Arc<dyn ChainNode> {
        &self.chain
    }

    pub fn wallet(&self) -> &Arc<dyn WalletStore> {
        &self.wallet
    }

    pub fn peers(&self) -> &PeerListProvider {
        &self.peers
    }

    pub fn keygen(&self) -> &KeyExchangeService {
        &self.keygen
    }

    pub fn deposits(&self) -> &DepositService {
        &self.deposits
    }

    pub fn withdrawals(&self) -> &WithdrawalCoordinator {
        &self.withdrawals
    }

    pub fn trigger(&self) -> &Topic {
        &self.trigger
    }

    pub fn session_watcher(&self) -> &SuffixWatcher {
        &self.session_watcher
    }

    pub fn accumulator_watcher(&self) -> &SuffixWatcher {
        &self.accumulator_watcher
    }

    pub fn health(&self) -> &Arc<HealthMonitor> {
        &self.health
    }

    pub fn asset(&self) -> &AssetId {
        &self.asset
    }
}
