//! Super-majority arithmetic.
//!
//! Quorums are computed fresh from the current peer set for every decision.
//! Callers must never cache a quorum across peer-set changes.

/// Signatures/entries required to trust an aggregated value: ⌊2n/3⌋ + 1.
pub fn super_majority(peer_count: usize) -> usize {
    peer_count * 2 / 3 + 1
}

/// True once `have` entries out of a `peer_count`-sized peer set are present.
pub fn reached(have: usize, peer_count: usize) -> bool {
    have >= super_majority(peer_count)
}
