//! Public-chain boundary.
//!
//! The bridge consumes the chain through a narrow event stream: block
//! downloads (already synchronized to confirmed height) and per-transaction
//! confidence changes. The peer-to-peer stack behind the trait may redeliver
//! both kinds of event; consumers deduplicate.

use crate::foundation::Result;
use async_trait::async_trait;
use bitcoin::{BlockHash, Txid};
use tokio::sync::mpsc;

pub mod mock;

pub use mock::MockChainNode;

/// One output of an observed transaction, reduced to what deposit detection
/// needs.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ObservedOutput {
    /// Destination address rendered in the chain's canonical encoding.
    pub address: String,
    pub amount_sat: u64,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ObservedTransaction {
    pub txid: Txid,
    pub outputs: Vec<ObservedOutput>,
}

/// A downloaded block with the transactions it carries.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ObservedBlock {
    pub hash: BlockHash,
    pub height: u64,
    pub time_ms: u64,
    pub transactions: Vec<ObservedTransaction>,
}

/// Events the chain node pushes to the bridge.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ChainEvent {
    BlocksDownloaded(ObservedBlock),
    ConfidenceChanged { txid: Txid, depth: u64 },
}

/// Ordered stream of chain events. Dropping the subscription detaches it.
pub struct ChainEventSubscription {
    receiver: mpsc::UnboundedReceiver<ChainEvent>,
}

impl ChainEventSubscription {
    pub fn new(receiver: mpsc::UnboundedReceiver<ChainEvent>) -> Self {
        Self { receiver }
    }

    pub async fn next(&mut self) -> Option<ChainEvent> {
        self.receiver.recv().await
    }
}

#[async_trait]
pub trait ChainNode: Send + Sync {
    /// Subscribes to block-download and confidence-change events.
    async fn subscribe_events(&self) -> Result<ChainEventSubscription>;

    /// Looks up a block by hash; used by restart recovery to re-anchor
    /// persisted unconfirmed deposits.
    async fn block_by_hash(&self, hash: &BlockHash) -> Result<Option<ObservedBlock>>;

    /// Current confirmed chain height.
    async fn current_height(&self) -> Result<u64>;

    /// Broadcasts a fully signed transaction, returning its txid.
    async fn broadcast(&self, raw_tx_hex: &str) -> Result<Txid>;
}

/// Depth of a block at `height` given the current `tip`, in the 1-based
/// convention (the tip itself has depth 1).
pub fn depth_at(tip: u64, height: u64) -> u64 {
    tip.saturating_sub(height).saturating_add(1)
}
