//! System-wide constants for the custody bridge.

/// Milliseconds per second.
pub const MILLIS_PER_SECOND: u64 = 1_000;

/// Milliseconds per day (24 * 60 * 60 * 10^3).
pub const MILLIS_PER_DAY: u64 = 24 * 60 * 60 * MILLIS_PER_SECOND;

/// Blocks older than this are dropped on arrival: any ledger transaction they
/// would produce falls outside the ledger's createdTime freshness window.
pub const STALE_BLOCK_WINDOW_MS: u64 = MILLIS_PER_DAY;

/// Freshness window the in-memory ledger enforces on transaction createdTime,
/// in either direction.
pub const LEDGER_FRESHNESS_WINDOW_MS: u64 = MILLIS_PER_DAY;

/// Default confirmation depth before a deposit is considered final.
pub const DEFAULT_CONFIDENCE_LEVEL: u64 = 6;

/// Standardness cap on P2SH multisig participants.
pub const MAX_MULTISIG_KEYS: usize = 15;

/// Default capacity of the processed-block dedup set. Must stay far above one
/// day of blocks so eviction can never readmit a block the staleness rule
/// would still accept.
pub const DEFAULT_PROCESSED_BLOCK_CAPACITY: usize = 16_384;

/// Ledger domain holding notary service accounts and the well-known bridge
/// accounts.
pub const NOTARY_DOMAIN: &str = "notary";

/// Ledger domain for key-exchange session accounts.
pub const SESSION_DOMAIN: &str = "btcSession";

/// Ledger domain for per-withdrawal consensus accumulator accounts.
pub const CONSENSUS_DOMAIN: &str = "btcConsensus";

/// Well-known account the generation trigger publishes to.
pub const DEFAULT_TRIGGER_ACCOUNT: &str = "btc_trigger@notary";

/// Well-known account listing active notary peers (key = notary id,
/// value = notary service account).
pub const DEFAULT_PEERS_ACCOUNT: &str = "notaries@notary";

/// Account keeping generated free addresses (key = address, value = JSON
/// address record).
pub const DEFAULT_FREE_ADDRESS_ACCOUNT: &str = "btc_free_addresses@notary";

/// Account keeping generated change addresses.
pub const DEFAULT_CHANGE_ADDRESS_ACCOUNT: &str = "btc_change_addresses@notary";

/// Account mapping registered deposit addresses to client accounts
/// (written by the registration service, read by the bridge).
pub const DEFAULT_REGISTERED_ADDRESS_ACCOUNT: &str = "btc_registered_addresses@notary";

/// Multi-signatory account holding withdrawal claims until settlement.
pub const DEFAULT_WITHDRAWAL_ACCOUNT: &str = "btc_withdrawal@notary";

/// Account collecting withdrawal fees.
pub const DEFAULT_BILLING_ACCOUNT: &str = "btc_billing@notary";

/// Reserve account deposits are credited from.
pub const DEFAULT_RESERVE_ACCOUNT: &str = "btc_reserve@notary";

/// Bridged asset id.
pub const DEFAULT_ASSET: &str = "btc#bitcoin";

/// Session account detail key recording the contributor-count snapshot taken
/// at session creation.
pub const EXPECTED_PEERS_KEY: &str = "expected_peers";

/// Session account detail key recording the creation time in milliseconds.
pub const SESSION_CREATED_AT_KEY: &str = "created_at_ms";

/// Accumulator account detail key holding the full request hash.
pub const REQUEST_HASH_KEY: &str = "request_hash";

/// Accumulator account detail key holding the observed withdrawal request as
/// JSON, so a restarted notary can rebuild it.
pub const REQUEST_DETAILS_KEY: &str = "request";

/// Withdrawal account detail key updated on every successful finalization.
pub const LAST_SUCCESSFUL_WITHDRAWAL_KEY: &str = "last_successful_withdrawal";

/// Rollback reasons are truncated to this many characters before being
/// written as a transfer description.
pub const MAX_ROLLBACK_REASON_CHARS: usize = 64;

/// Accumulator account names use this hex prefix of the request hash
/// (ledger account names are length-limited).
pub const ACCUMULATOR_NAME_HEX_CHARS: usize = 32;

/// Default number of submit attempts when the ledger rejects a transaction
/// for a stale signatory quorum.
pub const DEFAULT_QUORUM_RETRY_ATTEMPTS: u32 = 3;

/// Environment variable overriding wall-clock time in tests, in milliseconds.
pub const TEST_NOW_MS_ENV_VAR: &str = "BRIDGE_TEST_NOW_MS";
