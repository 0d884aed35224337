//! Non-persistent wallet store for unit tests.

use crate::domain::model::{DepositCandidate, SessionKeypair, WatchedAddress};
use crate::foundation::{BridgeError, Result, SessionId};
use crate::infrastructure::wallet::{UnconfirmedDeposit, WalletData, WalletStore};
use bitcoin::Txid;
use std::sync::{Mutex, MutexGuard};

pub struct MemoryWalletStore {
    data: Mutex<WalletData>,
}

impl MemoryWalletStore {
    pub fn new() -> Self {
        Self { data: Mutex::new(WalletData::default()) }
    }

    /// Starts from pre-seeded contents, as restart tests need.
    pub fn with_data(data: WalletData) -> Self {
        Self { data: Mutex::new(data) }
    }

    fn lock_data(&self) -> Result<MutexGuard<'_, WalletData>> {
        self.data
            .lock()
            .map_err(|_| BridgeError::StorageError { operation: "memory wallet lock".to_string(), details: "poisoned".to_string() })
    }

    pub fn snapshot(&self) -> Result<WalletData> {
        Ok(self.lock_data()?.clone())
    }
}

impl Default for MemoryWalletStore {
    fn default() -> Self {
        Self::new()
    }
}

impl WalletStore for MemoryWalletStore {
    fn add_watched_address(&self, address: WatchedAddress) -> Result<()> {
        self.lock_data()?.add_watched(address);
        Ok(())
    }

    fn watched_addresses(&self) -> Result<Vec<WatchedAddress>> {
        Ok(self.lock_data()?.watched_addresses.clone())
    }

    fn is_watched(&self, address: &str) -> Result<bool> {
        Ok(self.lock_data()?.watched_addresses.iter().any(|watched| watched.record.address == address))
    }

    fn put_session_keypair(&self, keypair: SessionKeypair) -> Result<()> {
        self.lock_data()?.put_keypair(keypair);
        Ok(())
    }

    fn session_keypair(&self, session: &SessionId) -> Result<Option<SessionKeypair>> {
        Ok(self.lock_data()?.session_keys.iter().find(|keypair| keypair.session == *session).cloned())
    }

    fn upsert_unconfirmed(&self, candidate: DepositCandidate, depth: u64) -> Result<()> {
        self.lock_data()?.upsert_unconfirmed(candidate, depth);
        Ok(())
    }

    fn remove_unconfirmed(&self, txid: &Txid) -> Result<()> {
        self.lock_data()?.unconfirmed.retain(|entry| entry.candidate.txid != *txid);
        Ok(())
    }

    fn unconfirmed_deposits(&self) -> Result<Vec<UnconfirmedDeposit>> {
        Ok(self.lock_data()?.unconfirmed.clone())
    }
}
