//! Withdrawal finalization and rollback on the ledger.
//!
//! Both operations move funds out of the multi-signatory withdrawal account.
//! Every notary that reaches consensus submits the settlement, so the built
//! transaction must be a deterministic function of the request: the creator
//! is the shared withdrawal account and the createdTime is the request's own
//! createdTime, letting the ledger aggregate the submissions into one commit.
//! The account's signatory quorum is re-read immediately before every build
//! and the submit is retried on the ledger's stale-quorum rejection. Nothing
//! here silently drops a request: the terminal failure carries the request
//! hash.

use crate::domain::finalization::{rollback_reason, FinalizationDetails};
use crate::domain::model::WithdrawalDetails;
use crate::foundation::{AccountId, AssetId, ErrorCode, LedgerTxHash, Result, LAST_SUCCESSFUL_WITHDRAWAL_KEY};
use crate::infrastructure::audit::{audit, AuditEvent};
use crate::infrastructure::ledger::{LedgerApi, LedgerCommand, LedgerTransaction};
use bitcoin::Txid;
use log::{info, warn};
use std::sync::Arc;

pub struct SettlementService {
    ledger: Arc<dyn LedgerApi>,
    withdrawal_account: AccountId,
    billing_account: AccountId,
    asset: AssetId,
    fee_sat: u64,
    quorum_retry_attempts: u32,
}

impl SettlementService {
    pub fn new(
        ledger: Arc<dyn LedgerApi>,
        withdrawal_account: AccountId,
        billing_account: AccountId,
        asset: AssetId,
        fee_sat: u64,
        quorum_retry_attempts: u32,
    ) -> Self {
        Self { ledger, withdrawal_account, billing_account, asset, fee_sat, quorum_retry_attempts: quorum_retry_attempts.max(1) }
    }

    pub fn fee_sat(&self) -> u64 {
        self.fee_sat
    }

    /// Builds with a fresh quorum and retries on `StaleQuorum` only.
    async fn submit_with_quorum_retry(
        &self,
        build: impl Fn(u32) -> Result<LedgerTransaction>,
    ) -> Result<LedgerTxHash> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let quorum = self.ledger.account_quorum(&self.withdrawal_account).await?;
            let tx = build(quorum)?;
            match self.ledger.submit(tx).await {
                Ok(hash) => return Ok(hash),
                Err(err) if err.code() == ErrorCode::StaleQuorum && attempt < self.quorum_retry_attempts => {
                    warn!(
                        "quorum changed between read and submit, retrying account={} attempt={} error={}",
                        self.withdrawal_account, attempt, err
                    );
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Settles a completed withdrawal: pays the fee (when configured),
    /// records the terminal outcome, and burns the amount to keep the
    /// two-way-peg accounting consistent.
    pub async fn finalize_withdrawal(&self, details: &WithdrawalDetails, btc_txid: &Txid) -> Result<LedgerTxHash> {
        let record = FinalizationDetails { withdrawal: details.clone(), fee_sat: self.fee_sat, btc_txid: btc_txid.to_string() };
        let record_json = record.to_json()?;
        let request_id = details.request_id();

        let ledger_tx = self
            .submit_with_quorum_retry(|quorum| {
                let mut commands = Vec::new();
                if self.fee_sat > 0 {
                    commands.push(LedgerCommand::TransferAsset {
                        source: self.withdrawal_account.clone(),
                        destination: self.billing_account.clone(),
                        asset: self.asset.clone(),
                        description: "withdrawal fee".to_string(),
                        amount: self.fee_sat,
                    });
                }
                commands.push(LedgerCommand::SetAccountDetail {
                    account: self.withdrawal_account.clone(),
                    key: LAST_SUCCESSFUL_WITHDRAWAL_KEY.to_string(),
                    value: record_json.clone(),
                });
                commands.push(LedgerCommand::SubtractAssetQuantity {
                    account: self.withdrawal_account.clone(),
                    asset: self.asset.clone(),
                    amount: details.amount_sat,
                });
                Ok(LedgerTransaction {
                    creator: self.withdrawal_account.clone(),
                    created_time_ms: details.created_time_ms,
                    quorum,
                    commands,
                })
            })
            .await
            .map_err(|err| {
                warn!("finalization failed request_id={} error={}", request_id, err);
                err
            })?;

        audit(AuditEvent::WithdrawalFinalized {
            request_id: request_id.to_string(),
            btc_txid: btc_txid.to_string(),
            ledger_tx: ledger_tx.to_string(),
            fee_sat: self.fee_sat,
        });
        info!("withdrawal finalized request_id={} btc_txid={} ledger_tx={}", request_id, btc_txid, ledger_tx);
        Ok(ledger_tx)
    }

    /// Issues the compensating transfer returning the amount (and the fee,
    /// when one was taken) to the originating account.
    pub async fn rollback_withdrawal(&self, details: &WithdrawalDetails, reason: &str) -> Result<LedgerTxHash> {
        let description = rollback_reason(reason);
        let request_id = details.request_id();

        let ledger_tx = self
            .submit_with_quorum_retry(|quorum| {
                let mut commands = vec![LedgerCommand::TransferAsset {
                    source: self.withdrawal_account.clone(),
                    destination: details.source_account.clone(),
                    asset: self.asset.clone(),
                    description: description.clone(),
                    amount: details.amount_sat,
                }];
                if self.fee_sat > 0 {
                    commands.push(LedgerCommand::TransferAsset {
                        source: self.withdrawal_account.clone(),
                        destination: details.source_account.clone(),
                        asset: self.asset.clone(),
                        description: description.clone(),
                        amount: self.fee_sat,
                    });
                }
                Ok(LedgerTransaction {
                    creator: self.withdrawal_account.clone(),
                    created_time_ms: details.created_time_ms,
                    quorum,
                    commands,
                })
            })
            .await
            .map_err(|err| {
                warn!("rollback failed request_id={} error={}", request_id, err);
                err
            })?;

        audit(AuditEvent::WithdrawalRolledBack {
            request_id: request_id.to_string(),
            reason: description.clone(),
            ledger_tx: ledger_tx.to_string(),
        });
        info!("withdrawal rolled back request_id={} reason={} ledger_tx={}", request_id, description, ledger_tx);
        Ok(ledger_tx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::util::time::now_millis;
    use crate::infrastructure::ledger::MemoryLedger;
    use std::str::FromStr;

    fn details(amount_sat: u64) -> WithdrawalDetails {
        WithdrawalDetails {
            source_account: AccountId::new("client@notary"),
            destination_address: "2N3oefVeg6stiTb5Kh3ozCSkaqmx91FDbsm".to_string(),
            amount_sat,
            asset: AssetId::new("btc#bitcoin"),
            created_time_ms: now_millis(),
        }
    }

    fn btc_txid() -> Txid {
        Txid::from_str(&hex::encode([0x42; 32])).expect("txid")
    }

    fn setup(fee_sat: u64) -> (Arc<MemoryLedger>, SettlementService) {
        let ledger = Arc::new(MemoryLedger::new());
        let withdrawal = AccountId::new("btc_withdrawal@notary");
        let billing = AccountId::new("btc_billing@notary");
        let asset = AssetId::new("btc#bitcoin");
        ledger.register_account(withdrawal.clone(), 1).expect("register withdrawal");
        ledger.register_account(billing.clone(), 1).expect("register billing");
        ledger.register_account(AccountId::new("client@notary"), 1).expect("register client");
        ledger.seed_balance(&withdrawal, &asset, 1_000).expect("seed");

        let service = SettlementService::new(ledger.clone(), withdrawal, billing, asset, fee_sat, 3);
        (ledger, service)
    }

    #[tokio::test]
    async fn finalize_pays_fee_records_outcome_and_burns() {
        let (ledger, service) = setup(2);
        service.finalize_withdrawal(&details(100), &btc_txid()).await.expect("finalize");

        let asset = AssetId::new("btc#bitcoin");
        assert_eq!(ledger.balance(&AccountId::new("btc_billing@notary"), &asset).expect("billing"), 2);
        assert_eq!(ledger.balance(&AccountId::new("btc_withdrawal@notary"), &asset).expect("withdrawal"), 1_000 - 2 - 100);

        let recorded = ledger
            .account_details(&AccountId::new("btc_withdrawal@notary"), None)
            .await
            .expect("details");
        let record = FinalizationDetails::from_json(recorded.get(LAST_SUCCESSFUL_WITHDRAWAL_KEY).expect("record")).expect("parse");
        assert_eq!(record.withdrawal.amount_sat, 100);
        assert_eq!(record.fee_sat, 2);
    }

    #[tokio::test]
    async fn finalize_without_fee_skips_the_fee_leg() {
        let (ledger, service) = setup(0);
        service.finalize_withdrawal(&details(100), &btc_txid()).await.expect("finalize");
        let asset = AssetId::new("btc#bitcoin");
        assert_eq!(ledger.balance(&AccountId::new("btc_billing@notary"), &asset).expect("billing"), 0);
        assert_eq!(ledger.balance(&AccountId::new("btc_withdrawal@notary"), &asset).expect("withdrawal"), 900);
    }

    #[tokio::test]
    async fn rollback_returns_amount_and_fee_as_separate_transfers() {
        let (ledger, service) = setup(2);
        let mut subscription = ledger.subscribe_blocks().await.expect("subscribe");
        service.rollback_withdrawal(&details(100), "Spend FAILED: no UTXOs").await.expect("rollback");

        let asset = AssetId::new("btc#bitcoin");
        assert_eq!(ledger.balance(&AccountId::new("client@notary"), &asset).expect("client"), 102);

        let block = subscription.next().await.expect("block");
        let transfers: Vec<_> = block
            .commands
            .iter()
            .filter_map(|c| match &c.command {
                LedgerCommand::TransferAsset { amount, description, .. } => Some((*amount, description.clone())),
                _ => None,
            })
            .collect();
        assert_eq!(transfers.len(), 2);
        assert_eq!(transfers[0].0, 100);
        assert_eq!(transfers[1].0, 2);
        assert_eq!(transfers[0].1, "spend failed: no utxos");
    }

    #[tokio::test]
    async fn rollback_with_zero_fee_issues_exactly_one_transfer() {
        let (ledger, service) = setup(0);
        let mut subscription = ledger.subscribe_blocks().await.expect("subscribe");
        service.rollback_withdrawal(&details(100), "stalled").await.expect("rollback");

        let block = subscription.next().await.expect("block");
        let transfer_count = block
            .commands
            .iter()
            .filter(|c| matches!(c.command, LedgerCommand::TransferAsset { .. }))
            .count();
        assert_eq!(transfer_count, 1);
    }

    #[tokio::test]
    async fn stale_quorum_is_retried_with_a_fresh_read() {
        let (ledger, service) = setup(0);
        // The build closure reads the quorum fresh each attempt, so a bumped
        // quorum must not break finalization.
        ledger.set_account_quorum(&AccountId::new("btc_withdrawal@notary"), 2).expect("bump quorum");
        service.finalize_withdrawal(&details(50), &btc_txid()).await.expect("finalize at quorum 2");
    }
}
