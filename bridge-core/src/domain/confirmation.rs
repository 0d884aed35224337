//! Per-transaction confirmation state machine.
//!
//! The upstream chain library can replay or duplicate depth-change events for
//! the same transaction. The map-entry transition under one lock is the sole
//! mechanism guaranteeing the deposit handler fires at most once per txid.

use crate::domain::model::DepositCandidate;
use crate::foundation::{BridgeError, Result};
use bitcoin::Txid;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

/// Tracking state of one deposit transaction.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum TrackState {
    /// Below the confidence level; `depth` is the last observed depth.
    Waiting { depth: u64 },
    /// Reached the confidence level; the handler has fired.
    Final,
}

struct TrackEntry {
    candidate: DepositCandidate,
    state: TrackState,
}

/// Concurrent map of txid → tracking state.
///
/// `observe`, `on_depth_change` and `reattach` return the candidate exactly
/// when the caller must run the deposit handler; duplicate events for an
/// already-final transaction return `None`.
pub struct ConfirmationTracker {
    confidence_level: u64,
    entries: Mutex<HashMap<Txid, TrackEntry>>,
}

impl ConfirmationTracker {
    pub fn new(confidence_level: u64) -> Self {
        Self { confidence_level, entries: Mutex::new(HashMap::new()) }
    }

    pub fn confidence_level(&self) -> u64 {
        self.confidence_level
    }

    fn lock_entries(&self) -> Result<MutexGuard<'_, HashMap<Txid, TrackEntry>>> {
        self.entries
            .lock()
            .map_err(|_| BridgeError::StorageError { operation: "confirmation tracker lock".to_string(), details: "poisoned".to_string() })
    }

    /// First observation of a candidate at `depth`.
    ///
    /// Returns the candidate when it is already final at first sight and the
    /// handler must run now. Re-observing a known txid only updates the
    /// recorded depth (never re-fires).
    pub fn observe(&self, candidate: DepositCandidate, depth: u64) -> Result<Option<DepositCandidate>> {
        let mut entries = self.lock_entries()?;
        let txid = candidate.txid;
        match entries.get_mut(&txid) {
            Some(entry) => {
                if let TrackState::Waiting { depth: recorded } = &mut entry.state {
                    *recorded = depth.max(*recorded);
                }
                Ok(None)
            }
            None if depth >= self.confidence_level => {
                entries.insert(txid, TrackEntry { candidate: candidate.clone(), state: TrackState::Final });
                Ok(Some(candidate))
            }
            None => {
                entries.insert(txid, TrackEntry { candidate, state: TrackState::Waiting { depth } });
                Ok(None)
            }
        }
    }

    /// Depth-change notification for a tracked transaction.
    ///
    /// Transitions Waiting → Final exactly once at the threshold; duplicate
    /// or late events for a final transaction are no-ops, as are events for
    /// transactions that were never observed.
    pub fn on_depth_change(&self, txid: &Txid, depth: u64) -> Result<Option<DepositCandidate>> {
        let mut entries = self.lock_entries()?;
        let Some(entry) = entries.get_mut(txid) else {
            return Ok(None);
        };
        match &mut entry.state {
            TrackState::Final => Ok(None),
            TrackState::Waiting { .. } if depth >= self.confidence_level => {
                entry.state = TrackState::Final;
                Ok(Some(entry.candidate.clone()))
            }
            TrackState::Waiting { depth: recorded } => {
                *recorded = depth.max(*recorded);
                Ok(None)
            }
        }
    }

    /// Restores a Waiting entry after restart without firing the handler.
    pub fn reattach(&self, candidate: DepositCandidate, depth: u64) -> Result<()> {
        let mut entries = self.lock_entries()?;
        entries.entry(candidate.txid).or_insert(TrackEntry { candidate, state: TrackState::Waiting { depth } });
        Ok(())
    }

    /// Drops a terminal entry once the credit has been submitted.
    pub fn forget(&self, txid: &Txid) -> Result<()> {
        self.lock_entries()?.remove(txid);
        Ok(())
    }

    pub fn state(&self, txid: &Txid) -> Result<Option<TrackState>> {
        Ok(self.lock_entries()?.get(txid).map(|entry| entry.state.clone()))
    }

    /// Candidate of a transaction still in `Waiting`.
    pub fn waiting_candidate(&self, txid: &Txid) -> Result<Option<DepositCandidate>> {
        Ok(self
            .lock_entries()?
            .get(txid)
            .filter(|entry| matches!(entry.state, TrackState::Waiting { .. }))
            .map(|entry| entry.candidate.clone()))
    }

    /// Number of transactions still below the confidence level.
    pub fn waiting_count(&self) -> Result<usize> {
        Ok(self.lock_entries()?.values().filter(|entry| matches!(entry.state, TrackState::Waiting { .. })).count())
    }
}
