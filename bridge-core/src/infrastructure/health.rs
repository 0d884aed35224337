//! Process health signal.
//!
//! Stream failures are not recovered in-process (the dedup set and the
//! confidence listeners are not resumable mid-stream); the monitor flips
//! unhealthy and an external supervisor restarts the process.

use std::sync::atomic::{AtomicBool, Ordering};

pub struct HealthMonitor {
    ledger_ok: AtomicBool,
    chain_ok: AtomicBool,
}

impl HealthMonitor {
    pub fn new() -> Self {
        Self { ledger_ok: AtomicBool::new(true), chain_ok: AtomicBool::new(true) }
    }

    pub fn set_ledger_ok(&self, ok: bool) {
        self.ledger_ok.store(ok, Ordering::Relaxed);
    }

    pub fn set_chain_ok(&self, ok: bool) {
        self.chain_ok.store(ok, Ordering::Relaxed);
    }

    pub fn ledger_ok(&self) -> bool {
        self.ledger_ok.load(Ordering::Relaxed)
    }

    pub fn chain_ok(&self) -> bool {
        self.chain_ok.load(Ordering::Relaxed)
    }

    pub fn healthy(&self) -> bool {
        self.ledger_ok() && self.chain_ok()
    }
}

impl Default for HealthMonitor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn either_stream_failure_makes_unhealthy() {
        let health = HealthMonitor::new();
        assert!(health.healthy());

        health.set_chain_ok(false);
        assert!(!health.healthy());
        assert!(health.ledger_ok());

        // Reconnect flips back to healthy.
        health.set_chain_ok(true);
        assert!(health.healthy());

        health.set_ledger_ok(false);
        assert!(!health.healthy());
    }
}
