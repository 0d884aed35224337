use crate::foundation::{AccountId, AssetId, NotaryId, RequestId, SessionId};
use bitcoin::{BlockHash, Txid};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One notary in the active peer set, as recorded on the peer-list account.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct NotaryPeer {
    pub notary_id: NotaryId,
    /// The notary's own ledger service account.
    pub account: AccountId,
}

/// Purpose of a generated custody address.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressKind {
    /// Handed to clients for deposits once registered.
    Free,
    /// Used for change outputs of withdrawal transactions.
    Change,
}

impl AddressKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AddressKind::Free => "free",
            AddressKind::Change => "change",
        }
    }
}

impl fmt::Display for AddressKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AddressKind {
    type Err = crate::foundation::BridgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "free" => Ok(AddressKind::Free),
            "change" => Ok(AddressKind::Change),
            other => Err(crate::foundation::BridgeError::ParseError(format!("unknown address kind: {other}"))),
        }
    }
}

/// Deterministic description of a generated multisig address, published to the
/// ledger. Every notary derives the identical record from the same session, so
/// concurrent writes collapse to an idempotent rewrite.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct AddressRecord {
    pub address: String,
    pub kind: AddressKind,
    /// Compressed public keys in the derivation order (sorted), hex encoded.
    pub public_keys: Vec<String>,
    /// Signatures required to spend. Always equals the key count.
    pub threshold: usize,
    /// Redeem script backing the P2SH address, hex encoded.
    pub redeem_script: String,
}

/// An address this notary watches for deposits, kept in the local wallet.
///
/// The embedded record is immutable after creation; local metadata records
/// where it came from.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct WatchedAddress {
    #[serde(flatten)]
    pub record: AddressRecord,
    /// Session account the keys were exchanged through.
    pub session: SessionId,
    pub generated_at_ms: u64,
}

/// A session-scoped signing keypair held in the wallet. The secret stays
/// local; only the public key is written to the session account.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct SessionKeypair {
    pub session: SessionId,
    /// Compressed public key, hex encoded.
    pub public_key: String,
    /// Secret key, hex encoded. The wallet file is the custody boundary.
    pub secret_key: String,
}

/// A deposit observed on the public chain, prior to reaching the confidence
/// level. Persisted so restarts can re-register confirmation trackers.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct DepositCandidate {
    pub txid: Txid,
    pub block_hash: BlockHash,
    /// Timestamp of the containing block, used as the deterministic
    /// createdTime of the eventual credit transaction.
    pub block_time_ms: u64,
    /// The watched address the outputs pay.
    pub address: String,
    /// Sum of outputs paying the address within the transaction.
    pub amount_sat: u64,
    pub seen_at_ms: u64,
}

/// A withdrawal request reconstructed from a transfer into the withdrawal
/// account. All fields come from the committed ledger command, so every
/// notary derives the identical value and the identical request id.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct WithdrawalDetails {
    pub source_account: AccountId,
    /// Destination Bitcoin address, taken from the transfer description.
    pub destination_address: String,
    /// Net amount to send on the public chain (transfer amount minus fee).
    pub amount_sat: u64,
    pub asset: AssetId,
    /// createdTime of the committed request transaction, in milliseconds.
    pub created_time_ms: u64,
}

impl WithdrawalDetails {
    /// Identity of the request across all notaries.
    pub fn request_id(&self) -> RequestId {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.source_account.as_bytes());
        hasher.update(b"|");
        hasher.update(self.destination_address.as_bytes());
        hasher.update(b"|");
        hasher.update(&self.amount_sat.to_le_bytes());
        hasher.update(self.asset.as_bytes());
        hasher.update(b"|");
        hasher.update(&self.created_time_ms.to_le_bytes());
        RequestId::new(*hasher.finalize().as_bytes())
    }
}

/// One notary's contribution to the withdrawal consensus accumulator.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ConsensusEntry {
    /// Highest block height whose transactions have reached the confidence
    /// level from this notary's view of the chain.
    pub available_height: u64,
    /// Peer-list size observed when the entry was produced.
    pub peer_count: u32,
}

/// The agreed transaction-construction parameters: the element-wise minimum
/// over all accumulator entries.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct WithdrawalConsensus {
    pub available_height: u64,
    pub peer_count: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn details() -> WithdrawalDetails {
        WithdrawalDetails {
            source_account: AccountId::new("client@notary"),
            destination_address: "2N3oefVeg6stiTb5Kh3ozCSkaqmx91FDbsm".to_string(),
            amount_sat: 100,
            asset: AssetId::new("btc#bitcoin"),
            created_time_ms: 1_700_000_000_000,
        }
    }

    #[test]
    fn request_id_is_deterministic() {
        assert_eq!(details().request_id(), details().request_id());
    }

    #[test]
    fn request_id_changes_with_any_field() {
        let base = details().request_id();

        let mut changed = details();
        changed.amount_sat = 101;
        assert_ne!(changed.request_id(), base);

        let mut changed = details();
        changed.destination_address.push('x');
        assert_ne!(changed.request_id(), base);

        let mut changed = details();
        changed.created_time_ms += 1;
        assert_ne!(changed.request_id(), base);
    }

    #[test]
    fn address_kind_parses_both_ways() {
        assert_eq!("free".parse::<AddressKind>().expect("free"), AddressKind::Free);
        assert_eq!(AddressKind::Change.to_string(), "change");
        assert!("escrow".parse::<AddressKind>().is_err());
    }

    #[test]
    fn watched_address_serde_flattens_record() {
        let watched = WatchedAddress {
            record: AddressRecord {
                address: "2N3oefVeg6stiTb5Kh3ozCSkaqmx91FDbsm".to_string(),
                kind: AddressKind::Free,
                public_keys: vec!["02aa".into(), "03bb".into()],
                threshold: 2,
                redeem_script: "5221".to_string(),
            },
            session: SessionId::new("free_ab@btcSession"),
            generated_at_ms: 42,
        };
        let json = serde_json::to_value(&watched).expect("serialize");
        assert_eq!(json["kind"], "free");
        assert_eq!(json["threshold"], 2);
        let back: WatchedAddress = serde_json::from_value(json).expect("deserialize");
        assert_eq!(back, watched);
    }
}
