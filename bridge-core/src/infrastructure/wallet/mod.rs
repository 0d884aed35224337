//! Local wallet state: watched addresses, session keypairs and unconfirmed
//! deposits. This is the only state that must survive a process restart; the
//! rest is rebuilt from the ledger.

use crate::domain::model::{DepositCandidate, SessionKeypair, WatchedAddress};
use crate::foundation::{Result, SessionId};
use bitcoin::Txid;
use serde::{Deserialize, Serialize};

pub mod file;
pub mod memory;

pub use file::FileWalletStore;
pub use memory::MemoryWalletStore;

/// A deposit below the confidence level, persisted so restart recovery can
/// re-register its confirmation tracker.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct UnconfirmedDeposit {
    pub candidate: DepositCandidate,
    /// Last observed confirmation depth.
    pub depth: u64,
}

/// Serialized wallet contents.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct WalletData {
    #[serde(default)]
    pub watched_addresses: Vec<WatchedAddress>,
    #[serde(default)]
    pub session_keys: Vec<SessionKeypair>,
    #[serde(default)]
    pub unconfirmed: Vec<UnconfirmedDeposit>,
}

/// Synchronous wallet persistence boundary.
///
/// Mutating operations are durable before they return on persistent
/// implementations; callers never batch their own persistence.
pub trait WalletStore: Send + Sync {
    fn add_watched_address(&self, address: WatchedAddress) -> Result<()>;
    fn watched_addresses(&self) -> Result<Vec<WatchedAddress>>;
    fn is_watched(&self, address: &str) -> Result<bool>;

    fn put_session_keypair(&self, keypair: SessionKeypair) -> Result<()>;
    fn session_keypair(&self, session: &SessionId) -> Result<Option<SessionKeypair>>;

    /// Inserts or updates the persisted depth of an unconfirmed deposit.
    fn upsert_unconfirmed(&self, candidate: DepositCandidate, depth: u64) -> Result<()>;
    fn remove_unconfirmed(&self, txid: &Txid) -> Result<()>;
    fn unconfirmed_deposits(&self) -> Result<Vec<UnconfirmedDeposit>>;
}

impl WalletData {
    pub(crate) fn upsert_unconfirmed(&mut self, candidate: DepositCandidate, depth: u64) {
        match self.unconfirmed.iter_mut().find(|entry| entry.candidate.txid == candidate.txid) {
            Some(entry) => entry.depth = depth,
            None => self.unconfirmed.push(UnconfirmedDeposit { candidate, depth }),
        }
    }

    pub(crate) fn add_watched(&mut self, address: WatchedAddress) {
        if !self.watched_addresses.iter().any(|existing| existing.record.address == address.record.address) {
            self.watched_addresses.push(address);
        }
    }

    pub(crate) fn put_keypair(&mut self, keypair: SessionKeypair) {
        match self.session_keys.iter_mut().find(|existing| existing.session == keypair.session) {
            Some(existing) => *existing = keypair,
            None => self.session_keys.push(keypair),
        }
    }
}
