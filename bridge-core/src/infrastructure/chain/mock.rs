//! Scriptable chain node for tests and devnet mode.

use crate::foundation::{BridgeError, Result};
use crate::infrastructure::chain::{ChainEvent, ChainEventSubscription, ChainNode, ObservedBlock};
use async_trait::async_trait;
use bitcoin::hashes::Hash;
use bitcoin::{BlockHash, Txid};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use tokio::sync::mpsc;

/// In-memory chain node. Tests push blocks and depth changes; the node fans
/// them out to every subscriber, including deliberate duplicates to exercise
/// the dedup paths.
pub struct MockChainNode {
    blocks: Mutex<HashMap<BlockHash, ObservedBlock>>,
    subscribers: Mutex<Vec<mpsc::UnboundedSender<ChainEvent>>>,
    broadcasts: Mutex<Vec<String>>,
    height: AtomicU64,
}

impl MockChainNode {
    pub fn new() -> Self {
        Self {
            blocks: Mutex::new(HashMap::new()),
            subscribers: Mutex::new(Vec::new()),
            broadcasts: Mutex::new(Vec::new()),
            height: AtomicU64::new(0),
        }
    }

    fn lock<'a, T>(&self, mutex: &'a Mutex<T>, what: &str) -> Result<MutexGuard<'a, T>> {
        mutex
            .lock()
            .map_err(|_| BridgeError::StorageError { operation: format!("mock chain {what} lock"), details: "poisoned".to_string() })
    }

    pub fn set_height(&self, height: u64) {
        self.height.store(height, Ordering::Relaxed);
    }

    fn emit(&self, event: ChainEvent) -> Result<()> {
        let mut subscribers = self.lock(&self.subscribers, "subscribers")?;
        subscribers.retain(|sender| sender.send(event.clone()).is_ok());
        Ok(())
    }

    /// Stores the block, advances the tip to its height and announces it.
    pub fn push_block(&self, block: ObservedBlock) -> Result<()> {
        self.lock(&self.blocks, "blocks")?.insert(block.hash, block.clone());
        let tip = self.height.load(Ordering::Relaxed).max(block.height);
        self.height.store(tip, Ordering::Relaxed);
        self.emit(ChainEvent::BlocksDownloaded(block))
    }

    /// Re-announces an already-stored block, mimicking the upstream
    /// redelivery defect.
    pub fn redeliver_block(&self, hash: &BlockHash) -> Result<()> {
        let block = self
            .lock(&self.blocks, "blocks")?
            .get(hash)
            .cloned()
            .ok_or_else(|| BridgeError::not_found("block", hash.to_string()))?;
        self.emit(ChainEvent::BlocksDownloaded(block))
    }

    /// Emits a confidence-change event; call repeatedly with the same depth
    /// to simulate replayed notifications.
    pub fn set_depth(&self, txid: Txid, depth: u64) -> Result<()> {
        self.emit(ChainEvent::ConfidenceChanged { txid, depth })
    }

    pub fn broadcast_count(&self) -> Result<usize> {
        Ok(self.lock(&self.broadcasts, "broadcasts")?.len())
    }
}

impl Default for MockChainNode {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChainNode for MockChainNode {
    async fn subscribe_events(&self) -> Result<ChainEventSubscription> {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.lock(&self.subscribers, "subscribers")?.push(sender);
        Ok(ChainEventSubscription::new(receiver))
    }

    async fn block_by_hash(&self, hash: &BlockHash) -> Result<Option<ObservedBlock>> {
        Ok(self.lock(&self.blocks, "blocks")?.get(hash).cloned())
    }

    async fn current_height(&self) -> Result<u64> {
        Ok(self.height.load(Ordering::Relaxed))
    }

    async fn broadcast(&self, raw_tx_hex: &str) -> Result<Txid> {
        self.lock(&self.broadcasts, "broadcasts")?.push(raw_tx_hex.to_string());
        let digest = blake3::hash(raw_tx_hex.as_bytes());
        Ok(Txid::from_byte_array(*digest.as_bytes()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::chain::ObservedTransaction;
    use std::str::FromStr;

    fn block(n: u8, height: u64) -> ObservedBlock {
        ObservedBlock {
            hash: BlockHash::from_str(&hex::encode([n; 32])).expect("hash"),
            height,
            time_ms: 1_700_000_000_000,
            transactions: Vec::<ObservedTransaction>::new(),
        }
    }

    #[tokio::test]
    async fn push_block_advances_tip_and_notifies() {
        let node = MockChainNode::new();
        let mut subscription = node.subscribe_events().await.expect("subscribe");

        node.push_block(block(1, 10)).expect("push");
        assert_eq!(node.current_height().await.expect("height"), 10);
        assert!(matches!(subscription.next().await, Some(ChainEvent::BlocksDownloaded(b)) if b.height == 10));
    }

    #[tokio::test]
    async fn redeliver_repeats_a_known_block() {
        let node = MockChainNode::new();
        let mut subscription = node.subscribe_events().await.expect("subscribe");
        let b = block(2, 5);
        node.push_block(b.clone()).expect("push");
        node.redeliver_block(&b.hash).expect("redeliver");

        assert!(subscription.next().await.is_some());
        assert!(matches!(subscription.next().await, Some(ChainEvent::BlocksDownloaded(again)) if again.hash == b.hash));
        assert!(node.redeliver_block(&block(9, 1).hash).is_err());
    }

    #[tokio::test]
    async fn broadcast_returns_deterministic_txid() {
        let node = MockChainNode::new();
        let a = node.broadcast("0100").await.expect("broadcast");
        let b = node.broadcast("0100").await.expect("broadcast again");
        assert_eq!(a, b);
        assert_eq!(node.broadcast_count().expect("count"), 2);
    }
}
