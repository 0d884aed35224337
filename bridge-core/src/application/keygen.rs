//! Session key exchange and multisig address generation.
//!
//! A generation round starts with a trigger publish carrying the session
//! account name. Every notary that observes the trigger races to create the
//! session (losing the race is fine) and contributes one public key. Key
//! contributions landing on session accounts are themselves observable
//! through the block stream, so each arrival re-attempts finalization. All
//! steps are idempotent: replays and duplicate deliveries are expected.

use crate::domain::address::{derive_multisig_address, parse_public_key};
use crate::domain::model::{AddressKind, SessionKeypair, WatchedAddress};
use crate::foundation::util::time::now_millis;
use crate::foundation::{
    AccountId, BridgeError, NotaryId, Result, SessionId, EXPECTED_PEERS_KEY, MILLIS_PER_DAY, MILLIS_PER_SECOND,
    SESSION_CREATED_AT_KEY, SESSION_DOMAIN,
};
use crate::infrastructure::audit::{audit, AuditEvent};
use crate::infrastructure::config::FinalizePolicy;
use crate::infrastructure::ledger::{LedgerApi, LedgerCommand, LedgerTransaction, Topic};
use crate::infrastructure::wallet::WalletStore;
use bitcoin::{Network, PublicKey};
use log::{debug, info, warn};
use rand::RngCore;
use secp256k1::Secp256k1;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

pub struct KeyExchangeService {
    ledger: Arc<dyn LedgerApi>,
    wallet: Arc<dyn WalletStore>,
    notary_id: NotaryId,
    account: AccountId,
    network: Network,
    free_address_account: AccountId,
    change_address_account: AccountId,
    policy: FinalizePolicy,
    finalize_timeout_ms: Option<u64>,
    /// Sessions this process has seen activity on and not yet finalized.
    /// Working set only; the ledger remains the source of truth.
    open_sessions: Mutex<HashSet<SessionId>>,
}

impl KeyExchangeService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        ledger: Arc<dyn LedgerApi>,
        wallet: Arc<dyn WalletStore>,
        notary_id: NotaryId,
        account: AccountId,
        network: Network,
        free_address_account: AccountId,
        change_address_account: AccountId,
        policy: FinalizePolicy,
        finalize_timeout_secs: Option<u64>,
    ) -> Self {
        Self {
            ledger,
            wallet,
            notary_id,
            account,
            network,
            free_address_account,
            change_address_account,
            policy,
            finalize_timeout_ms: finalize_timeout_secs.map(|secs| secs.saturating_mul(MILLIS_PER_SECOND)),
            open_sessions: Mutex::new(HashSet::new()),
        }
    }

    fn lock_open(&self) -> Result<MutexGuard<'_, HashSet<SessionId>>> {
        self.open_sessions
            .lock()
            .map_err(|_| BridgeError::StorageError { operation: "open sessions lock".to_string(), details: "poisoned".to_string() })
    }

    /// Fresh session account name: `{kind}_{suffix}@btcSession`.
    pub fn new_session_name(kind: AddressKind) -> SessionId {
        let mut suffix = [0u8; 4];
        rand::thread_rng().fill_bytes(&mut suffix);
        SessionId::new(format!("{}_{}@{}", kind, hex::encode(suffix), SESSION_DOMAIN))
    }

    /// Kind encoded in the session name prefix.
    pub fn session_kind(session: &SessionId) -> Result<AddressKind> {
        session
            .split('_')
            .next()
            .ok_or_else(|| BridgeError::ParseError(format!("malformed session name: {session}")))?
            .parse()
    }

    /// Asks the whole notary set for a new address of `kind` by publishing
    /// the session name on the trigger topic.
    pub async fn publish_generation_request(&self, topic: &Topic, kind: AddressKind) -> Result<SessionId> {
        let session = Self::new_session_name(kind);
        topic.publish(self.ledger.as_ref(), &self.account, session.as_str(), kind.as_str()).await?;
        info!("address generation requested kind={} session={}", kind, session);
        Ok(session)
    }

    /// Creates the session account with its `expected_peers` snapshot.
    ///
    /// `AlreadyExists` means another notary raced ahead; callers ignore it.
    pub async fn request_session(&self, session: &SessionId, expected_peers: usize) -> Result<()> {
        let quorum = self.ledger.account_quorum(&self.account).await.unwrap_or(1);
        let now = now_millis();
        let account = AccountId::new(session.as_str());
        self.ledger
            .submit(LedgerTransaction {
                creator: self.account.clone(),
                created_time_ms: now,
                quorum,
                commands: vec![
                    LedgerCommand::CreateAccount { account: account.clone() },
                    LedgerCommand::SetAccountDetail {
                        account: account.clone(),
                        key: EXPECTED_PEERS_KEY.to_string(),
                        value: expected_peers.to_string(),
                    },
                    LedgerCommand::SetAccountDetail {
                        account,
                        key: SESSION_CREATED_AT_KEY.to_string(),
                        value: now.to_string(),
                    },
                ],
            })
            .await?;
        Ok(())
    }

    /// Generates (or reuses) this notary's keypair for the session and
    /// writes the public key onto the session account. Idempotent: rewriting
    /// the same key is harmless.
    pub async fn contribute_key(&self, session: &SessionId) -> Result<PublicKey> {
        let keypair = match self.wallet.session_keypair(session)? {
            Some(existing) => existing,
            None => {
                let secp = Secp256k1::new();
                let (secret, public) = secp.generate_keypair(&mut rand::thread_rng());
                let keypair = SessionKeypair {
                    session: session.clone(),
                    public_key: PublicKey::new(public).to_string(),
                    secret_key: hex::encode(secret.secret_bytes()),
                };
                self.wallet.put_session_keypair(keypair.clone())?;
                debug!("session keypair generated session={} notary={}", session, self.notary_id);
                keypair
            }
        };

        let quorum = self.ledger.account_quorum(&self.account).await.unwrap_or(1);
        self.ledger
            .submit(LedgerTransaction {
                creator: self.account.clone(),
                created_time_ms: now_millis(),
                quorum,
                commands: vec![LedgerCommand::SetAccountDetail {
                    account: AccountId::new(session.as_str()),
                    key: self.notary_id.to_string(),
                    value: keypair.public_key.clone(),
                }],
            })
            .await?;
        self.lock_open()?.insert(session.clone());
        info!("key contributed session={} notary={}", session, self.notary_id);
        parse_public_key(&keypair.public_key)
    }

    /// Trigger handler: join the named session and contribute.
    pub async fn on_trigger(&self, session: &SessionId, kind: AddressKind, expected_peers: usize) -> Result<()> {
        match self.request_session(session, expected_peers).await {
            Ok(()) => info!("session created session={} kind={} expected_peers={}", session, kind, expected_peers),
            Err(err) if err.is_benign_race() => {
                debug!("session already created by a peer session={}", session);
            }
            Err(err) => return Err(err),
        }
        self.contribute_key(session).await?;
        Ok(())
    }

    fn satisfied(&self, contributions: usize, expected: Option<usize>, created_at_ms: Option<u64>, now_ms: u64) -> bool {
        if contributions == 0 {
            return false;
        }
        match self.policy {
            FinalizePolicy::AnyPresent => true,
            FinalizePolicy::WaitForAll => {
                match expected {
                    Some(expected) if contributions >= expected => true,
                    _ => {
                        // Partial set: only the expiry timeout may release it.
                        match (self.finalize_timeout_ms, created_at_ms) {
                            (Some(timeout), Some(created)) => now_ms >= created.saturating_add(timeout),
                            _ => false,
                        }
                    }
                }
            }
        }
    }

    /// Attempts to derive the multisig address for `session`.
    ///
    /// Idempotent: a repeat call with the same contribution set derives the
    /// identical record, and the ledger write collapses into a rewrite. The
    /// address is also recorded in the local wallet for deposit watching.
    pub async fn try_finalize(&self, session: &SessionId) -> Result<Option<WatchedAddress>> {
        let details = self.ledger.account_details(&AccountId::new(session.as_str()), None).await?;

        let expected = details.get(EXPECTED_PEERS_KEY).and_then(|value| value.parse::<usize>().ok());
        let created_at_ms = details.get(SESSION_CREATED_AT_KEY).and_then(|value| value.parse::<u64>().ok());
        if expected.is_none() && self.policy == FinalizePolicy::WaitForAll {
            warn!("session missing expected_peers snapshot, holding session={}", session);
        }

        let mut keys = Vec::new();
        for (key, value) in &details {
            if key == EXPECTED_PEERS_KEY || key == SESSION_CREATED_AT_KEY {
                continue;
            }
            match parse_public_key(value) {
                Ok(public_key) => keys.push(public_key),
                Err(err) => warn!("ignoring malformed contribution session={} contributor={} error={}", session, key, err),
            }
        }

        if !self.satisfied(keys.len(), expected, created_at_ms, now_millis()) {
            debug!(
                "finalization deferred session={} contributions={} expected={:?} policy={}",
                session,
                keys.len(),
                expected,
                self.policy
            );
            return Ok(None);
        }

        let kind = Self::session_kind(session)?;
        let key_count = keys.len();
        let record = derive_multisig_address(keys, kind, self.network)?;
        let target = match kind {
            AddressKind::Free => self.free_address_account.clone(),
            AddressKind::Change => self.change_address_account.clone(),
        };
        let record_json = serde_json::to_string(&record)?;

        let quorum = self.ledger.account_quorum(&self.account).await.unwrap_or(1);
        self.ledger
            .submit(LedgerTransaction {
                creator: self.account.clone(),
                created_time_ms: now_millis(),
                quorum,
                commands: vec![LedgerCommand::SetAccountDetail {
                    account: target,
                    key: record.address.clone(),
                    value: record_json,
                }],
            })
            .await?;

        let watched = WatchedAddress { record, session: session.clone(), generated_at_ms: now_millis() };
        self.wallet.add_watched_address(watched.clone())?;
        self.lock_open()?.remove(session);

        audit(AuditEvent::AddressGenerated {
            address: watched.record.address.clone(),
            kind: kind.to_string(),
            session: session.to_string(),
            key_count,
        });
        info!("address finalized session={} address={} keys={}", session, watched.record.address, key_count);
        Ok(Some(watched))
    }

    /// Session-domain activity handler: a peer contributed a key somewhere,
    /// so re-attempt finalization of that session.
    pub async fn on_session_activity(&self, session_account: &AccountId) -> Result<Option<WatchedAddress>> {
        let session = SessionId::new(session_account.as_str());
        self.lock_open()?.insert(session.clone());
        self.try_finalize(&session).await
    }

    /// Applies the timeout policy to every open session and drops abandoned
    /// empty ones from the working set. Driven by the service sweep interval.
    pub async fn sweep(&self) -> Result<usize> {
        let sessions: Vec<SessionId> = self.lock_open()?.iter().cloned().collect();
        let mut finalized = 0;
        for session in sessions {
            match self.try_finalize(&session).await {
                Ok(Some(_)) => finalized += 1,
                Ok(None) => self.expire_if_abandoned(&session).await?,
                Err(err) => warn!("sweep finalization failed session={} error={}", session, err),
            }
        }
        Ok(finalized)
    }

    /// A session with no contributions at all after the expiry window cannot
    /// finalize; drop it from the working set. The ledger account stays.
    async fn expire_if_abandoned(&self, session: &SessionId) -> Result<()> {
        let details = self.ledger.account_details(&AccountId::new(session.as_str()), None).await?;
        let contributions =
            details.keys().filter(|key| *key != EXPECTED_PEERS_KEY && *key != SESSION_CREATED_AT_KEY).count();
        if contributions > 0 {
            return Ok(());
        }
        let created_at_ms = details.get(SESSION_CREATED_AT_KEY).and_then(|value| value.parse::<u64>().ok());
        let window = self.finalize_timeout_ms.unwrap_or(MILLIS_PER_DAY);
        if let Some(created) = created_at_ms {
            if now_millis() >= created.saturating_add(window) {
                self.lock_open()?.remove(session);
                info!("abandoned session expired session={} age_window_ms={}", session, window);
            }
        }
        Ok(())
    }

    pub fn open_session_count(&self) -> Result<usize> {
        Ok(self.lock_open()?.len())
    }
}
