//! Registered notary peer list.
//!
//! The peer list lives as details on a well-known ledger account (key =
//! notary id, value = the notary's service account). Quorums are derived
//! from a fresh read every time; nothing here is cached.

use crate::domain::model::NotaryPeer;
use crate::domain::quorum::super_majority;
use crate::foundation::{AccountId, NotaryId, Result};
use crate::infrastructure::ledger::LedgerApi;
use std::sync::Arc;

pub struct PeerListProvider {
    ledger: Arc<dyn LedgerApi>,
    peers_account: AccountId,
}

impl PeerListProvider {
    pub fn new(ledger: Arc<dyn LedgerApi>, peers_account: AccountId) -> Self {
        Self { ledger, peers_account }
    }

    /// Current peer set, freshly read from the ledger.
    pub async fn peers(&self) -> Result<Vec<NotaryPeer>> {
        let details = self.ledger.account_details(&self.peers_account, None).await?;
        Ok(details
            .into_iter()
            .map(|(notary_id, account)| NotaryPeer { notary_id: NotaryId::new(notary_id), account: AccountId::new(account) })
            .collect())
    }

    pub async fn peer_count(&self) -> Result<usize> {
        Ok(self.peers().await?.len())
    }

    /// Super-majority threshold over the current peer set.
    pub async fn quorum(&self) -> Result<usize> {
        Ok(super_majority(self.peer_count().await?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::util::time::now_millis;
    use crate::infrastructure::ledger::{LedgerCommand, LedgerTransaction, MemoryLedger};

    #[tokio::test]
    async fn reads_fresh_peer_set_every_call() {
        let ledger = Arc::new(MemoryLedger::new());
        let peers_account = AccountId::new("notaries@notary");
        ledger.register_account(AccountId::new("admin@notary"), 1).expect("register");

        let provider = PeerListProvider::new(ledger.clone(), peers_account.clone());
        assert_eq!(provider.peer_count().await.expect("count"), 0);

        for (id, account) in [("notary-a", "a@notary"), ("notary-b", "b@notary"), ("notary-c", "c@notary"), ("notary-d", "d@notary")]
        {
            ledger
                .submit(LedgerTransaction {
                    creator: AccountId::new("admin@notary"),
                    created_time_ms: now_millis(),
                    quorum: 1,
                    commands: vec![LedgerCommand::SetAccountDetail {
                        account: peers_account.clone(),
                        key: id.to_string(),
                        value: account.to_string(),
                    }],
                })
                .await
                .expect("register peer");
        }

        let peers = provider.peers().await.expect("peers");
        assert_eq!(peers.len(), 4);
        assert_eq!(provider.quorum().await.expect("quorum"), 3);
    }
}
