//! Withdrawal consensus accumulator and reduction.
//!
//! Each notary contributes one `(available_height, peer_count)` entry per
//! withdrawal request. The agreed value is the element-wise minimum over all
//! entries; `min` is associative and commutative, so every notary that sees
//! the same entry set reduces to the same value regardless of arrival order.

use crate::domain::model::{ConsensusEntry, WithdrawalConsensus};
use crate::foundation::NotaryId;
use std::collections::BTreeMap;

/// Per-request collection of peer entries, keyed by contributing notary.
///
/// A ledger-backed copy is the source of truth; this in-process value is a
/// working set rebuilt from the ledger and dropped once consumed.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ConsensusAccumulator {
    entries: BTreeMap<NotaryId, ConsensusEntry>,
}

impl ConsensusAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one notary's entry. A rewrite by the same notary replaces its
    /// previous entry instead of growing the set.
    pub fn insert(&mut self, notary: NotaryId, entry: ConsensusEntry) {
        self.entries.insert(notary, entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Element-wise minimum over all entries; `None` while empty.
    pub fn reduce(&self) -> Option<WithdrawalConsensus> {
        reduce_entries(self.entries.values().copied())
    }
}

/// Reduces any entry collection to the common consensus value.
pub fn reduce_entries(entries: impl IntoIterator<Item = ConsensusEntry>) -> Option<WithdrawalConsensus> {
    entries.into_iter().fold(None, |acc, entry| {
        Some(match acc {
            None => WithdrawalConsensus { available_height: entry.available_height, peer_count: entry.peer_count },
            Some(value) => WithdrawalConsensus {
                available_height: value.available_height.min(entry.available_height),
                peer_count: value.peer_count.min(entry.peer_count),
            },
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(height: u64, peers: u32) -> ConsensusEntry {
        ConsensusEntry { available_height: height, peer_count: peers }
    }

    #[test]
    fn reduce_takes_elementwise_minimum() {
        // 4 notaries, quorum 3: three entries suffice.
        let entries = vec![entry(100, 4), entry(98, 4), entry(105, 3)];
        let value = reduce_entries(entries).expect("non-empty");
        assert_eq!(value, WithdrawalConsensus { available_height: 98, peer_count: 3 });
    }

    #[test]
    fn reduce_is_order_independent() {
        let entries = vec![entry(100, 4), entry(98, 4), entry(105, 3), entry(99, 5)];
        let expected = reduce_entries(entries.clone()).expect("reduce");

        // All rotations of the same set reduce to the same value.
        for rotation in 0..entries.len() {
            let mut rotated = entries.clone();
            rotated.rotate_left(rotation);
            assert_eq!(reduce_entries(rotated).expect("reduce rotated"), expected);
        }
        let mut reversed = entries;
        reversed.reverse();
        assert_eq!(reduce_entries(reversed).expect("reduce reversed"), expected);
    }

    #[test]
    fn empty_accumulator_reduces_to_none() {
        assert_eq!(ConsensusAccumulator::new().reduce(), None);
    }

    #[test]
    fn rewrite_by_same_notary_replaces_entry() {
        let mut acc = ConsensusAccumulator::new();
        acc.insert(NotaryId::new("a"), entry(100, 4));
        acc.insert(NotaryId::new("a"), entry(90, 4));
        assert_eq!(acc.len(), 1);
        assert_eq!(acc.reduce().expect("reduce").available_height, 90);
    }

    #[test]
    fn single_entry_reduces_to_itself() {
        let mut acc = ConsensusAccumulator::new();
        acc.insert(NotaryId::new("only"), entry(42, 7));
        assert_eq!(acc.reduce(), Some(WithdrawalConsensus { available_height: 42, peer_count: 7 }));
    }
}
