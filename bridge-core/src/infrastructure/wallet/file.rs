//! JSON wallet file with an exclusive OS lock.
//!
//! The wallet file may be shared between concurrently-running processes (a
//! live notary and an operator tool, say); the sidecar lock file is held for
//! the lifetime of the store so the second opener fails fast instead of
//! corrupting state. Every mutation rewrites the file via temp + rename, so
//! a crash mid-write leaves the previous contents intact.

use crate::domain::model::{DepositCandidate, SessionKeypair, WatchedAddress};
use crate::foundation::{BridgeError, Result, SessionId};
use crate::infrastructure::wallet::{UnconfirmedDeposit, WalletData, WalletStore};
use bitcoin::Txid;
use log::{debug, info};
use std::fs::{File, OpenOptions, TryLockError};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

#[derive(Debug)]
pub struct FileWalletStore {
    path: PathBuf,
    data: Mutex<WalletData>,
    /// Held, never read: dropping it releases the OS lock.
    _lock_file: File,
}

impl FileWalletStore {
    /// Loads the wallet at `path`, creating an empty one if absent. Fails
    /// with `WalletLocked` when another process holds the lock.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let lock_path = lock_path(&path);
        let lock_file = OpenOptions::new().create(true).write(true).open(&lock_path)?;
        match lock_file.try_lock() {
            Ok(()) => {}
            Err(TryLockError::WouldBlock) => {
                return Err(BridgeError::WalletLocked { path: path.display().to_string() });
            }
            Err(TryLockError::Error(err)) => return Err(err.into()),
        }

        let data = if path.exists() {
            let contents = std::fs::read_to_string(&path)?;
            serde_json::from_str(&contents)?
        } else {
            info!("creating empty wallet file path={}", path.display());
            WalletData::default()
        };
        debug!(
            "wallet loaded path={} watched={} unconfirmed={}",
            path.display(),
            data.watched_addresses.len(),
            data.unconfirmed.len()
        );

        Ok(Self { path, data: Mutex::new(data), _lock_file: lock_file })
    }

    fn lock_data(&self) -> Result<MutexGuard<'_, WalletData>> {
        self.data
            .lock()
            .map_err(|_| BridgeError::StorageError { operation: "wallet lock".to_string(), details: "poisoned".to_string() })
    }

    fn persist(&self, data: &WalletData) -> Result<()> {
        let json = serde_json::to_string_pretty(data)?;
        let tmp_path = self.path.with_extension("tmp");
        {
            let mut tmp = File::create(&tmp_path)?;
            tmp.write_all(json.as_bytes())?;
            tmp.sync_all()?;
        }
        std::fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }

    fn mutate(&self, apply: impl FnOnce(&mut WalletData)) -> Result<()> {
        let mut data = self.lock_data()?;
        apply(&mut data);
        self.persist(&data)
    }
}

fn lock_path(path: &Path) -> PathBuf {
    let mut os_string = path.as_os_str().to_os_string();
    os_string.push(".lock");
    PathBuf::from(os_string)
}

impl WalletStore for FileWalletStore {
    fn add_watched_address(&self, address: WatchedAddress) -> Result<()> {
        self.mutate(|data| data.add_watched(address))
    }

    fn watched_addresses(&self) -> Result<Vec<WatchedAddress>> {
        Ok(self.lock_data()?.watched_addresses.clone())
    }

    fn is_watched(&self, address: &str) -> Result<bool> {
        Ok(self.lock_data()?.watched_addresses.iter().any(|watched| watched.record.address == address))
    }

    fn put_session_keypair(&self, keypair: SessionKeypair) -> Result<()> {
        self.mutate(|data| data.put_keypair(keypair))
    }

    fn session_keypair(&self, session: &SessionId) -> Result<Option<SessionKeypair>> {
        Ok(self.lock_data()?.session_keys.iter().find(|keypair| keypair.session == *session).cloned())
    }

    fn upsert_unconfirmed(&self, candidate: DepositCandidate, depth: u64) -> Result<()> {
        self.mutate(|data| data.upsert_unconfirmed(candidate, depth))
    }

    fn remove_unconfirmed(&self, txid: &Txid) -> Result<()> {
        let txid = *txid;
        self.mutate(|data| data.unconfirmed.retain(|entry| entry.candidate.txid != txid))
    }

    fn unconfirmed_deposits(&self) -> Result<Vec<UnconfirmedDeposit>> {
        Ok(self.lock_data()?.unconfirmed.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn candidate() -> DepositCandidate {
        DepositCandidate {
            txid: Txid::from_str(&hex::encode([0x11; 32])).expect("txid"),
            block_hash: bitcoin::BlockHash::from_str(&hex::encode([0x22; 32])).expect("hash"),
            block_time_ms: 1_700_000_000_000,
            address: "2N3oefVeg6stiTb5Kh3ozCSkaqmx91FDbsm".to_string(),
            amount_sat: 1_000,
            seen_at_ms: 1_700_000_000_500,
        }
    }

    #[test]
    fn wallet_survives_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("wallet.json");

        {
            let wallet = FileWalletStore::open(&path).expect("open");
            wallet.upsert_unconfirmed(candidate(), 2).expect("upsert");
            wallet
                .put_session_keypair(SessionKeypair {
                    session: SessionId::new("free_01@btcSession"),
                    public_key: "02aa".to_string(),
                    secret_key: "11".to_string(),
                })
                .expect("keypair");
        }

        let reopened = FileWalletStore::open(&path).expect("reopen");
        let unconfirmed = reopened.unconfirmed_deposits().expect("unconfirmed");
        assert_eq!(unconfirmed.len(), 1);
        assert_eq!(unconfirmed[0].depth, 2);
        assert!(reopened.session_keypair(&SessionId::new("free_01@btcSession")).expect("lookup").is_some());
    }

    #[test]
    fn second_opener_fails_with_wallet_locked() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("wallet.json");

        let _first = FileWalletStore::open(&path).expect("first open");
        let err = FileWalletStore::open(&path).expect_err("second open");
        assert!(matches!(err, BridgeError::WalletLocked { .. }));
    }

    #[test]
    fn depth_update_replaces_not_duplicates() {
        let dir = tempfile::tempdir().expect("tempdir");
        let wallet = FileWalletStore::open(dir.path().join("wallet.json")).expect("open");

        wallet.upsert_unconfirmed(candidate(), 1).expect("insert");
        wallet.upsert_unconfirmed(candidate(), 4).expect("update");
        let unconfirmed = wallet.unconfirmed_deposits().expect("list");
        assert_eq!(unconfirmed.len(), 1);
        assert_eq!(unconfirmed[0].depth, 4);

        wallet.remove_unconfirmed(&candidate().txid).expect("remove");
        assert!(wallet.unconfirmed_deposits().expect("list").is_empty());
    }
}
