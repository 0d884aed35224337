//! Structured audit trail.
//!
//! Every terminal outcome of the bridge (address generated, deposit
//! credited, withdrawal finalized or rolled back) is recorded with the full
//! identifiers needed to manually replay the step if anything downstream is
//! lost.

use log::{debug, info, trace, warn};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, OnceLock};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditEvent {
    AddressGenerated {
        address: String,
        kind: String,
        session: String,
        key_count: usize,
    },
    DepositObserved {
        txid: String,
        address: String,
        amount_sat: u64,
        depth: u64,
    },
    DepositCredited {
        txid: String,
        client_account: String,
        amount_sat: u64,
        ledger_tx: String,
    },
    DepositSkipped {
        txid: String,
        address: String,
        reason: String,
    },
    WithdrawalObserved {
        request_id: String,
        source_account: String,
        destination_address: String,
        amount_sat: u64,
    },
    ConsensusReached {
        request_id: String,
        available_height: u64,
        peer_count: u32,
        entries: usize,
    },
    WithdrawalFinalized {
        request_id: String,
        btc_txid: String,
        ledger_tx: String,
        fee_sat: u64,
    },
    WithdrawalRolledBack {
        request_id: String,
        reason: String,
        ledger_tx: String,
    },
}

pub trait AuditLogger: Send + Sync {
    fn log(&self, event: AuditEvent);
}

/// Emits events through the process logger: full JSON at debug on a
/// dedicated target, a one-line summary at info.
pub struct StructuredAuditLogger;

impl AuditLogger for StructuredAuditLogger {
    fn log(&self, event: AuditEvent) {
        let json = match serde_json::to_string(&event) {
            Ok(json) => json,
            Err(err) => {
                warn!("audit: failed to serialize audit event error={}", err);
                "{\"type\":\"serialize_failed\"}".to_string()
            }
        };
        debug!(target: "bridge::audit::json", "audit event audit_event={}", json);
        info!(target: "bridge::audit::human", "audit summary={}", human_summary(&event));
    }
}

/// Appends one JSON line per event to a file.
pub struct FileAuditLogger {
    file: Arc<Mutex<std::fs::File>>,
}

impl FileAuditLogger {
    pub fn new(path: &std::path::Path) -> std::io::Result<Self> {
        let file = std::fs::OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self { file: Arc::new(Mutex::new(file)) })
    }
}

impl AuditLogger for FileAuditLogger {
    fn log(&self, event: AuditEvent) {
        use std::io::Write;

        let json = match serde_json::to_string(&event) {
            Ok(json) => json,
            Err(err) => {
                warn!("audit: failed to serialize audit event for file logger error={}", err);
                "{\"type\":\"serialize_failed\"}".to_string()
            }
        };
        match self.file.lock() {
            Ok(mut file) => {
                if let Err(err) = writeln!(file, "{}", json) {
                    warn!("audit: failed to write audit event to file error={}", err);
                    return;
                }
                if let Err(err) = file.flush() {
                    warn!("audit: failed to flush audit event to file error={}", err);
                }
            }
            Err(err) => {
                warn!("audit: failed to lock audit file mutex error={}", err);
            }
        }
    }
}

pub struct MultiAuditLogger {
    loggers: Vec<Box<dyn AuditLogger>>,
}

impl MultiAuditLogger {
    pub fn new() -> Self {
        Self { loggers: vec![] }
    }

    pub fn add_logger(&mut self, logger: Box<dyn AuditLogger>) {
        self.loggers.push(logger);
    }
}

impl Default for MultiAuditLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl AuditLogger for MultiAuditLogger {
    fn log(&self, event: AuditEvent) {
        for logger in &self.loggers {
            logger.log(event.clone());
        }
    }
}

static AUDIT_LOGGER: OnceLock<Box<dyn AuditLogger>> = OnceLock::new();

const SHORT_ID_DISPLAY_LENGTH: usize = 16;

pub fn init_audit_logger(logger: Box<dyn AuditLogger>) {
    if AUDIT_LOGGER.set(logger).is_err() {
        warn!("init_audit_logger called more than once; ignoring");
    }
}

pub fn audit(event: AuditEvent) {
    match AUDIT_LOGGER.get() {
        Some(logger) => logger.log(event),
        None => trace!("audit event dropped: no logger configured event={:?}", event),
    }
}

fn short_id(value: &str) -> String {
    let trimmed = value.trim_start_matches("0x").trim_start_matches("0X");
    if trimmed.len() <= SHORT_ID_DISPLAY_LENGTH {
        trimmed.to_string()
    } else {
        format!("{}..", &trimmed[..SHORT_ID_DISPLAY_LENGTH])
    }
}

fn human_summary(event: &AuditEvent) -> String {
    match event {
        AuditEvent::AddressGenerated { address, kind, session, key_count } => {
            format!("AUDIT: {} address generated - {} from {} keys (session: {})", kind, address, key_count, session)
        }
        AuditEvent::DepositObserved { txid, address, amount_sat, depth } => {
            format!("AUDIT: deposit observed - {} sat to {} at depth {} (txid: {})", amount_sat, address, depth, short_id(txid))
        }
        AuditEvent::DepositCredited { txid, client_account, amount_sat, ledger_tx } => format!(
            "AUDIT: deposit credited - {} sat to {} (txid: {}, ledger_tx: {})",
            amount_sat,
            client_account,
            short_id(txid),
            short_id(ledger_tx)
        ),
        AuditEvent::DepositSkipped { txid, address, reason } => {
            format!("AUDIT: deposit skipped - {} (txid: {}, reason: {})", address, short_id(txid), reason)
        }
        AuditEvent::WithdrawalObserved { request_id, source_account, destination_address, amount_sat } => format!(
            "AUDIT: withdrawal observed - {} sat from {} to {} (request: {})",
            amount_sat,
            source_account,
            destination_address,
            short_id(request_id)
        ),
        AuditEvent::ConsensusReached { request_id, available_height, peer_count, entries } => format!(
            "AUDIT: consensus reached - height={} peers={} from {} entries (request: {})",
            available_height,
            peer_count,
            entries,
            short_id(request_id)
        ),
        AuditEvent::WithdrawalFinalized { request_id, btc_txid, ledger_tx, fee_sat } => format!(
            "AUDIT: withdrawal finalized - fee={} sat (request: {}, btc_txid: {}, ledger_tx: {})",
            fee_sat,
            short_id(request_id),
            short_id(btc_txid),
            short_id(ledger_tx)
        ),
        AuditEvent::WithdrawalRolledBack { request_id, reason, ledger_tx } => format!(
            "AUDIT: withdrawal rolled back - reason={} (request: {}, ledger_tx: {})",
            reason,
            short_id(request_id),
            short_id(ledger_tx)
        ),
    }
}
