//! Committed-block consumer.
//!
//! A single task drains the ledger block stream so that in-block command
//! order is the happens-before relation every handler sees. Dispatch failures
//! are logged per command and never tear down the loop; only stream closure
//! does, flipping the health monitor for the supervisor.

use crate::service::flow::BridgeFlow;
use bridge_core::domain::model::AddressKind;
use bridge_core::foundation::{Result, SessionId};
use bridge_core::infrastructure::ledger::{CommittedCommand, LedgerBlockSubscription};
use log::{debug, info, warn};
use std::sync::Arc;
use std::time::Duration;

pub async fn run_ledger_loop(flow: Arc<BridgeFlow>, mut subscription: LedgerBlockSubscription) {
    let mut sweep = tokio::time::interval(Duration::from_secs(flow.config().keygen.sweep_interval_secs.max(1)));
    sweep.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = sweep.tick() => {
                match flow.keygen().sweep().await {
                    Ok(finalized) if finalized > 0 => debug!("session sweep finalized sessions finalized={}", finalized),
                    Ok(_) => {}
                    Err(err) => warn!("session sweep failed error={}", err),
                }
            }
            block = subscription.next() => {
                let Some(block) = block else {
                    warn!("ledger block stream closed, marking unhealthy");
                    flow.health().set_ledger_ok(false);
                    break;
                };
                debug!("ledger block received height={} commands={}", block.height, block.commands.len());
                for committed in &block.commands {
                    if let Err(err) = dispatch(&flow, committed).await {
                        warn!("ledger command handler failed command={} error={}", committed.command.name(), err);
                    }
                }
            }
        }
    }
}

async fn dispatch(flow: &BridgeFlow, committed: &CommittedCommand) -> Result<()> {
    if let Some((session, kind)) = flow.trigger().matches(committed) {
        let kind: AddressKind = kind.parse()?;
        let session = SessionId::new(session);
        let expected_peers = flow.peers().peer_count().await?;
        return flow.keygen().on_trigger(&session, kind, expected_peers).await;
    }

    if let Some((account, _key)) = flow.session_watcher().matches(committed) {
        if let Some(watched) = flow.keygen().on_session_activity(account).await? {
            info!("address finalized address={} kind={}", watched.record.address, watched.record.kind);
        }
        return Ok(());
    }

    if let Some((account, _key)) = flow.accumulator_watcher().matches(committed) {
        return flow.withdrawals().on_accumulator_activity(account).await;
    }

    if let Some(details) = flow.withdrawals().observe_command(committed, flow.asset()) {
        return flow.withdrawals().handle_request(details).await;
    }

    Ok(())
}
