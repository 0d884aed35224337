//! Processed-block deduplication.
//!
//! The public chain's peer stack occasionally redelivers a block it already
//! announced. This set drops those duplicates for the lifetime of the
//! process. It is a best-effort guard, not a correctness guarantee: the
//! confirmation tracker stays idempotent per txid regardless.

use bitcoin::BlockHash;
use std::collections::{HashSet, VecDeque};

/// Recency-bounded set of block hashes already handed to deposit extraction.
///
/// Capacity must stay far above one day of blocks: the staleness rule drops
/// anything older, so eviction can never readmit a block that would still be
/// processed.
pub struct ProcessedBlocks {
    capacity: usize,
    seen: HashSet<BlockHash>,
    order: VecDeque<BlockHash>,
}

impl ProcessedBlocks {
    pub fn new(capacity: usize) -> Self {
        Self { capacity: capacity.max(1), seen: HashSet::new(), order: VecDeque::new() }
    }

    /// Records `hash`; returns `false` when the block was already processed
    /// and must be dropped.
    pub fn insert(&mut self, hash: BlockHash) -> bool {
        if !self.seen.insert(hash) {
            return false;
        }
        self.order.push_back(hash);
        while self.order.len() > self.capacity {
            if let Some(evicted) = self.order.pop_front() {
                self.seen.remove(&evicted);
            }
        }
        true
    }

    pub fn contains(&self, hash: &BlockHash) -> bool {
        self.seen.contains(hash)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn hash(n: u8) -> BlockHash {
        BlockHash::from_str(&hex::encode([n; 32])).expect("block hash")
    }

    #[test]
    fn duplicate_insert_is_rejected() {
        let mut set = ProcessedBlocks::new(16);
        assert!(set.insert(hash(1)));
        assert!(!set.insert(hash(1)));
        assert!(set.contains(&hash(1)));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn eviction_is_oldest_first() {
        let mut set = ProcessedBlocks::new(3);
        for n in 1..=4 {
            assert!(set.insert(hash(n)));
        }
        assert_eq!(set.len(), 3);
        assert!(!set.contains(&hash(1)));
        assert!(set.contains(&hash(4)));

        // An evicted hash is accepted again; the staleness rule upstream is
        // what prevents this from mattering in practice.
        assert!(set.insert(hash(1)));
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let mut set = ProcessedBlocks::new(0);
        assert!(set.insert(hash(9)));
        assert!(!set.insert(hash(9)));
    }
}
