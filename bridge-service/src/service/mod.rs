//! Long-running service tasks and their lifecycle.

pub mod chain_loop;
pub mod flow;
pub mod ledger_loop;

pub use flow::{BridgeFlow, BridgeStats};

use bridge_core::foundation::Result;
use log::info;
use std::sync::Arc;

/// Aborts the wrapped task when dropped so a `ServiceHandle` going out of
/// scope tears the whole notary down.
pub struct AbortOnDrop(tokio::task::JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Keeps the event loops alive. Drop it to stop the notary.
pub struct ServiceHandle {
    _ledger: AbortOnDrop,
    _chain: AbortOnDrop,
}

/// Subscribes to both event streams, replays deposit-tracking state from the
/// ledger and the chain node, then spawns the two consumer loops.
///
/// Both subscriptions are created before either loop starts, so events
/// committed between recovery and spawn are not lost.
pub async fn start(flow: Arc<BridgeFlow>) -> Result<ServiceHandle> {
    let ledger_subscription = flow.ledger().subscribe_blocks().await?;
    let chain_subscription = flow.chain().subscribe_events().await?;

    let recovered = flow.deposits().recover(flow.chain().as_ref()).await?;
    if recovered > 0 {
        info!("deposit recovery rebuilt pending candidates count={}", recovered);
    }

    flow.health().set_ledger_ok(true);
    flow.health().set_chain_ok(true);

    let ledger_task = tokio::spawn(ledger_loop::run_ledger_loop(flow.clone(), ledger_subscription));
    let chain_task = tokio::spawn(chain_loop::run_chain_loop(flow, chain_subscription));

    Ok(ServiceHandle { _ledger: AbortOnDrop(ledger_task), _chain: AbortOnDrop(chain_task) })
}
