//! Chain event consumer.
//!
//! One task per process drains the chain node's event stream. The upstream
//! stack may redeliver blocks and replay confidence changes; all of that is
//! absorbed downstream, so this loop only routes.

use crate::service::flow::BridgeFlow;
use bridge_core::infrastructure::chain::{ChainEvent, ChainEventSubscription};
use log::{debug, warn};
use std::sync::Arc;

pub async fn run_chain_loop(flow: Arc<BridgeFlow>, mut subscription: ChainEventSubscription) {
    loop {
        let Some(event) = subscription.next().await else {
            warn!("chain event stream closed, marking unhealthy");
            flow.health().set_chain_ok(false);
            break;
        };
        match event {
            ChainEvent::BlocksDownloaded(block) => {
                // The announced block may itself be the new tip.
                let tip = match flow.chain().current_height().await {
                    Ok(height) => height.max(block.height),
                    Err(err) => {
                        warn!("chain height query failed, using block height hash={} error={}", block.hash, err);
                        block.height
                    }
                };
                match flow.deposits().on_block(&block, tip).await {
                    Ok(taken) if taken > 0 => debug!("block handled hash={} candidates={}", block.hash, taken),
                    Ok(_) => {}
                    Err(err) => warn!("block handler failed hash={} error={}", block.hash, err),
                }
            }
            ChainEvent::ConfidenceChanged { txid, depth } => {
                if let Err(err) = flow.deposits().on_confidence_changed(&txid, depth).await {
                    warn!("confidence handler failed txid={} depth={} error={}", txid, depth, err);
                }
            }
        }
    }
}
