use crate::foundation::{
    AccountId, AssetId, NotaryId, DEFAULT_ASSET, DEFAULT_BILLING_ACCOUNT, DEFAULT_CHANGE_ADDRESS_ACCOUNT, DEFAULT_CONFIDENCE_LEVEL,
    DEFAULT_FREE_ADDRESS_ACCOUNT, DEFAULT_PEERS_ACCOUNT, DEFAULT_PROCESSED_BLOCK_CAPACITY, DEFAULT_QUORUM_RETRY_ATTEMPTS,
    DEFAULT_REGISTERED_ADDRESS_ACCOUNT, DEFAULT_RESERVE_ACCOUNT, DEFAULT_TRIGGER_ACCOUNT, DEFAULT_WITHDRAWAL_ACCOUNT,
    STALE_BLOCK_WINDOW_MS,
};
use bitcoin::Network;
use serde::{Deserialize, Serialize};

/// When a session may be finalized into an address.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinalizePolicy {
    /// Wait until every peer in the session's `expected_peers` snapshot has
    /// contributed. An optional timeout can still derive from a partial set.
    #[default]
    WaitForAll,
    /// Derive from whatever contributions are present when triggered.
    /// Kept for compatibility with deployments that gate finalization
    /// externally; prone to partial-key-set derivation otherwise.
    AnyPresent,
}

impl std::fmt::Display for FinalizePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::WaitForAll => write!(f, "wait_for_all"),
            Self::AnyPresent => write!(f, "any_present"),
        }
    }
}

/// Identity and local paths of this notary process.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServiceSection {
    /// Stable notary identity; doubles as the detail key for contributions.
    #[serde(default)]
    pub notary_id: String,
    /// This notary's ledger service account (transaction creator).
    #[serde(default)]
    pub account: String,
    #[serde(default)]
    pub data_dir: String,
    /// Wallet file path; defaults to `${data_dir}/wallet.json`.
    #[serde(default)]
    pub wallet_file: Option<String>,
}

impl Default for ServiceSection {
    fn default() -> Self {
        Self { notary_id: String::new(), account: String::new(), data_dir: String::new(), wallet_file: None }
    }
}

/// Well-known ledger accounts and submit policy.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerSection {
    pub trigger_account: String,
    pub peers_account: String,
    pub free_address_account: String,
    pub change_address_account: String,
    pub registered_address_account: String,
    pub withdrawal_account: String,
    pub billing_account: String,
    pub reserve_account: String,
    pub asset: String,
    /// Attempts when the ledger rejects a submit for a stale quorum.
    pub quorum_retry_attempts: u32,
}

impl Default for LedgerSection {
    fn default() -> Self {
        Self {
            trigger_account: DEFAULT_TRIGGER_ACCOUNT.to_string(),
            peers_account: DEFAULT_PEERS_ACCOUNT.to_string(),
            free_address_account: DEFAULT_FREE_ADDRESS_ACCOUNT.to_string(),
            change_address_account: DEFAULT_CHANGE_ADDRESS_ACCOUNT.to_string(),
            registered_address_account: DEFAULT_REGISTERED_ADDRESS_ACCOUNT.to_string(),
            withdrawal_account: DEFAULT_WITHDRAWAL_ACCOUNT.to_string(),
            billing_account: DEFAULT_BILLING_ACCOUNT.to_string(),
            reserve_account: DEFAULT_RESERVE_ACCOUNT.to_string(),
            asset: DEFAULT_ASSET.to_string(),
            quorum_retry_attempts: DEFAULT_QUORUM_RETRY_ATTEMPTS,
        }
    }
}

/// Public-chain observation settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainSection {
    /// bitcoin | testnet | signet | regtest.
    pub network: String,
    pub confidence_level: u64,
    pub processed_block_capacity: usize,
    /// Blocks older than this are dropped on arrival.
    pub stale_block_window_ms: u64,
}

impl Default for ChainSection {
    fn default() -> Self {
        Self {
            network: "regtest".to_string(),
            confidence_level: DEFAULT_CONFIDENCE_LEVEL,
            processed_block_capacity: DEFAULT_PROCESSED_BLOCK_CAPACITY,
            stale_block_window_ms: STALE_BLOCK_WINDOW_MS,
        }
    }
}

/// Session finalization policy.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct KeygenSection {
    pub finalize_policy: FinalizePolicy,
    /// With `wait_for_all`, sessions older than this may finalize from a
    /// partial (non-empty) contribution set. `None` waits forever.
    pub session_finalize_timeout_secs: Option<u64>,
    /// Interval of the sweep applying the timeout policy to open sessions.
    pub sweep_interval_secs: u64,
}

impl Default for KeygenSection {
    fn default() -> Self {
        Self { finalize_policy: FinalizePolicy::default(), session_finalize_timeout_secs: None, sweep_interval_secs: 30 }
    }
}

/// Withdrawal settlement settings.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WithdrawalSection {
    /// Flat fee collected into the billing account; 0 disables the fee leg.
    pub fee_sat: u64,
}

/// Operator HTTP API.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiSection {
    pub enabled: bool,
    pub addr: String,
}

impl Default for ApiSection {
    fn default() -> Self {
        Self { enabled: true, addr: "127.0.0.1:8099".to_string() }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub service: ServiceSection,
    pub ledger: LedgerSection,
    pub chain: ChainSection,
    pub keygen: KeygenSection,
    pub withdrawal: WithdrawalSection,
    pub api: ApiSection,
}

impl BridgeConfig {
    pub fn notary_id(&self) -> NotaryId {
        NotaryId::new(self.service.notary_id.clone())
    }

    pub fn account(&self) -> AccountId {
        AccountId::new(self.service.account.clone())
    }

    pub fn asset(&self) -> AssetId {
        AssetId::new(self.ledger.asset.clone())
    }

    pub fn network(&self) -> Result<Network, crate::foundation::BridgeError> {
        self.chain
            .network
            .parse::<Network>()
            .map_err(|err| crate::foundation::BridgeError::ConfigError(format!("invalid chain.network '{}': {}", self.chain.network, err)))
    }

    pub fn wallet_file(&self) -> String {
        self.service
            .wallet_file
            .clone()
            .unwrap_or_else(|| format!("{}/wallet.json", self.service.data_dir.trim_end_matches('/')))
    }
}
