use secp256k1::Error as SecpError;
use std::io;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    AlreadyExists,
    NotFound,
    StaleQuorum,
    QuorumNotReached,
    MissingDetail,
    LedgerRejected,
    StreamClosed,
    InvalidAddress,
    InvalidPublicKey,
    TooManyKeys,
    WalletLocked,
    SpendFailed,
    NodeError,
    StorageError,
    SerializationError,
    CryptoError,
    ConfigError,
    InvalidStateTransition,
    EncodingError,
    ParseError,
    Unimplemented,
    Message,
}

#[derive(Debug, Error)]
pub enum BridgeError {
    /// Benign write race: another notary created the same entity first, or an
    /// identical record is already present. Call sites log and move on.
    #[error("already exists: {entity} {id}")]
    AlreadyExists { entity: String, id: String },

    #[error("not found: {entity} {id}")]
    NotFound { entity: String, id: String },

    /// The ledger rejected a transaction because the account quorum changed
    /// between read and submit. Transient: recompute and retry.
    #[error("stale quorum for {account}: transaction carried {submitted}, account requires {required}")]
    StaleQuorum { account: String, submitted: u32, required: u32 },

    #[error("quorum not reached: have {have}, need {need}")]
    QuorumNotReached { have: usize, need: usize },

    #[error("missing detail {key} on account {account}")]
    MissingDetail { account: String, key: String },

    #[error("ledger rejected {command}: {details}")]
    LedgerRejected { command: String, details: String },

    #[error("{stream} stream closed")]
    StreamClosed { stream: String },

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("invalid public key: input={input} reason={reason}")]
    InvalidPublicKey { input: String, reason: String },

    #[error("too many multisig keys: {count} exceeds {max}")]
    TooManyKeys { count: usize, max: usize },

    #[error("wallet file locked by another process: {path}")]
    WalletLocked { path: String },

    #[error("spend execution failed for request {request_id}: {details}")]
    SpendFailed { request_id: String, details: String },

    #[error("chain node error: {0}")]
    NodeError(String),

    #[error("storage error during {operation}: {details}")]
    StorageError { operation: String, details: String },

    #[error("{format} serialization error: {details}")]
    SerializationError { format: String, details: String },

    #[error("crypto error during {operation}: {details}")]
    CryptoError { operation: String, details: String },

    #[error("configuration error: {0}")]
    ConfigError(String),

    #[error("invalid state transition: {from} -> {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("encoding error: {0}")]
    EncodingError(String),

    #[error("parse error: {0}")]
    ParseError(String),

    #[error("feature not implemented: {0}")]
    Unimplemented(String),

    #[error("{0}")]
    Message(String),
}

pub type Result<T> = std::result::Result<T, BridgeError>;

impl BridgeError {
    pub fn code(&self) -> ErrorCode {
        match self {
            BridgeError::AlreadyExists { .. } => ErrorCode::AlreadyExists,
            BridgeError::NotFound { .. } => ErrorCode::NotFound,
            BridgeError::StaleQuorum { .. } => ErrorCode::StaleQuorum,
            BridgeError::QuorumNotReached { .. } => ErrorCode::QuorumNotReached,
            BridgeError::MissingDetail { .. } => ErrorCode::MissingDetail,
            BridgeError::LedgerRejected { .. } => ErrorCode::LedgerRejected,
            BridgeError::StreamClosed { .. } => ErrorCode::StreamClosed,
            BridgeError::InvalidAddress(_) => ErrorCode::InvalidAddress,
            BridgeError::InvalidPublicKey { .. } => ErrorCode::InvalidPublicKey,
            BridgeError::TooManyKeys { .. } => ErrorCode::TooManyKeys,
            BridgeError::WalletLocked { .. } => ErrorCode::WalletLocked,
            BridgeError::SpendFailed { .. } => ErrorCode::SpendFailed,
            BridgeError::NodeError(_) => ErrorCode::NodeError,
            BridgeError::StorageError { .. } => ErrorCode::StorageError,
            BridgeError::SerializationError { .. } => ErrorCode::SerializationError,
            BridgeError::CryptoError { .. } => ErrorCode::CryptoError,
            BridgeError::ConfigError(_) => ErrorCode::ConfigError,
            BridgeError::InvalidStateTransition { .. } => ErrorCode::InvalidStateTransition,
            BridgeError::EncodingError(_) => ErrorCode::EncodingError,
            BridgeError::ParseError(_) => ErrorCode::ParseError,
            BridgeError::Unimplemented(_) => ErrorCode::Unimplemented,
            BridgeError::Message(_) => ErrorCode::Message,
        }
    }

    pub fn already_exists(entity: impl Into<String>, id: impl Into<String>) -> Self {
        BridgeError::AlreadyExists { entity: entity.into(), id: id.into() }
    }

    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        BridgeError::NotFound { entity: entity.into(), id: id.into() }
    }

    pub fn missing_detail(account: impl Into<String>, key: impl Into<String>) -> Self {
        BridgeError::MissingDetail { account: account.into(), key: key.into() }
    }

    /// True for the write races the protocol treats as success.
    pub fn is_benign_race(&self) -> bool {
        matches!(self, BridgeError::AlreadyExists { .. })
    }
}

impl From<hex::FromHexError> for BridgeError {
    fn from(err: hex::FromHexError) -> Self {
        BridgeError::EncodingError(format!("hex decode error: {}", err))
    }
}

impl From<toml::de::Error> for BridgeError {
    fn from(err: toml::de::Error) -> Self {
        BridgeError::ConfigError(format!("TOML parsing error: {}", err))
    }
}

impl From<io::Error> for BridgeError {
    fn from(err: io::Error) -> Self {
        BridgeError::StorageError { operation: "io".to_string(), details: err.to_string() }
    }
}

impl From<serde_json::Error> for BridgeError {
    fn from(err: serde_json::Error) -> Self {
        BridgeError::SerializationError { format: "json".to_string(), details: err.to_string() }
    }
}

impl From<SecpError> for BridgeError {
    fn from(err: SecpError) -> Self {
        BridgeError::CryptoError { operation: "secp256k1".to_string(), details: err.to_string() }
    }
}

impl From<bitcoin::address::ParseError> for BridgeError {
    fn from(err: bitcoin::address::ParseError) -> Self {
        BridgeError::InvalidAddress(err.to_string())
    }
}

#[macro_export]
macro_rules! storage_err {
    ($op:expr, $err:expr) => {
        $crate::foundation::BridgeError::StorageError { operation: $op.into(), details: $err.to_string() }
    };
}

#[macro_export]
macro_rules! serde_err {
    ($fmt:expr, $err:expr) => {
        $crate::foundation::BridgeError::SerializationError { format: $fmt.into(), details: $err.to_string() }
    };
}

// NOTE: Avoid adding generic "stringly" error conversions here.
// Use structured `BridgeError` variants at the call site to preserve context.
