//! Pub/sub over ledger account details.
//!
//! Publishing writes a detail on a well-known trigger account; subscribing is
//! replaying the committed command stream and matching on the target account.
//! Delivery is at-least-once, possibly many times; every handler downstream
//! must be idempotent. There is no acknowledgement channel.

use crate::foundation::util::time::now_millis;
use crate::foundation::{AccountId, LedgerTxHash, Result};
use crate::infrastructure::ledger::{CommittedCommand, LedgerApi, LedgerCommand, LedgerTransaction};

/// A named channel backed by one trigger account.
#[derive(Clone, Debug)]
pub struct Topic {
    account: AccountId,
}

impl Topic {
    pub fn new(account: AccountId) -> Self {
        Self { account }
    }

    pub fn account(&self) -> &AccountId {
        &self.account
    }

    /// Publishes `key=value` by committing a detail write on the trigger
    /// account. This is the entire publish step.
    pub async fn publish(&self, ledger: &dyn LedgerApi, publisher: &AccountId, key: &str, value: &str) -> Result<LedgerTxHash> {
        let quorum = ledger.account_quorum(publisher).await.unwrap_or(1);
        ledger
            .submit(LedgerTransaction {
                creator: publisher.clone(),
                created_time_ms: now_millis(),
                quorum,
                commands: vec![LedgerCommand::SetAccountDetail {
                    account: self.account.clone(),
                    key: key.to_string(),
                    value: value.to_string(),
                }],
            })
            .await
    }

    /// Matches a committed command against this topic, yielding the
    /// published `(key, value)`.
    pub fn matches<'a>(&self, committed: &'a CommittedCommand) -> Option<(&'a str, &'a str)> {
        match &committed.command {
            LedgerCommand::SetAccountDetail { account, key, value } if *account == self.account => {
                Some((key.as_str(), value.as_str()))
            }
            _ => None,
        }
    }
}

/// Matches detail writes on any account whose name ends with a domain
/// suffix. Used to observe key contributions landing on session accounts.
#[derive(Clone, Debug)]
pub struct SuffixWatcher {
    suffix: String,
}

impl SuffixWatcher {
    pub fn new(suffix: impl Into<String>) -> Self {
        Self { suffix: suffix.into() }
    }

    /// Returns the target account and written key when the command is a
    /// detail write into the watched domain.
    pub fn matches<'a>(&self, committed: &'a CommittedCommand) -> Option<(&'a AccountId, &'a str)> {
        match &committed.command {
            LedgerCommand::SetAccountDetail { account, key, .. } if account.ends_with(&self.suffix) => {
                Some((account, key.as_str()))
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::ledger::MemoryLedger;

    fn committed(account: &str, key: &str, value: &str) -> CommittedCommand {
        CommittedCommand {
            creator: AccountId::new("a@notary"),
            created_time_ms: now_millis(),
            command: LedgerCommand::SetAccountDetail {
                account: AccountId::new(account),
                key: key.to_string(),
                value: value.to_string(),
            },
        }
    }

    #[tokio::test]
    async fn publish_lands_in_the_block_stream() {
        let ledger = MemoryLedger::new();
        let publisher = AccountId::new("a@notary");
        ledger.register_account(publisher.clone(), 1).expect("register");
        let topic = Topic::new(AccountId::new("btc_trigger@notary"));

        let mut subscription = ledger.subscribe_blocks().await.expect("subscribe");
        topic.publish(&ledger, &publisher, "free", "generate").await.expect("publish");

        let block = subscription.next().await.expect("block");
        let matched: Vec<_> = block.commands.iter().filter_map(|c| topic.matches(c)).collect();
        assert_eq!(matched, vec![("free", "generate")]);
    }

    #[test]
    fn topic_ignores_other_accounts_and_commands() {
        let topic = Topic::new(AccountId::new("btc_trigger@notary"));
        assert!(topic.matches(&committed("btc_trigger@notary", "k", "v")).is_some());
        assert!(topic.matches(&committed("other@notary", "k", "v")).is_none());

        let transfer = CommittedCommand {
            creator: AccountId::new("a@notary"),
            created_time_ms: now_millis(),
            command: LedgerCommand::CreateAccount { account: AccountId::new("btc_trigger@notary") },
        };
        assert!(topic.matches(&transfer).is_none());
    }

    #[test]
    fn suffix_watcher_matches_session_domain() {
        let watcher = SuffixWatcher::new("@btcSession");
        let entry = committed("free_01ab@btcSession", "notary-b", "02aa");
        let hit = watcher.matches(&entry);
        assert_eq!(hit.map(|(account, key)| (account.as_str(), key)), Some(("free_01ab@btcSession", "notary-b")));
        assert!(watcher.matches(&committed("btc_trigger@notary", "k", "v")).is_none());
    }
}
