//! Deterministic multisig address derivation.
//!
//! Every notary derives the address from the same session contributions, so
//! the derivation must be a pure function of the key set: keys are sorted by
//! their compressed serialization before entering the redeem script, and the
//! threshold always equals the key count (all contributors must co-sign).

use crate::domain::model::{AddressKind, AddressRecord};
use crate::foundation::{BridgeError, Result, MAX_MULTISIG_KEYS};
use bitcoin::address::Address;
use bitcoin::opcodes::all::OP_CHECKMULTISIG;
use bitcoin::script::Builder;
use bitcoin::{Network, PublicKey, ScriptBuf};

/// Parses a hex-encoded compressed public key as written on a session account.
pub fn parse_public_key(hex_key: &str) -> Result<PublicKey> {
    hex_key
        .parse::<PublicKey>()
        .map_err(|err| BridgeError::InvalidPublicKey { input: hex_key.to_string(), reason: err.to_string() })
}

/// Sorts keys into the canonical derivation order.
pub fn sort_keys(mut keys: Vec<PublicKey>) -> Vec<PublicKey> {
    keys.sort_by_key(|key| key.to_bytes());
    keys
}

/// Builds the n-of-n redeem script over already-sorted keys.
fn multisig_script(keys: &[PublicKey]) -> ScriptBuf {
    let n = keys.len() as i64;
    let mut builder = Builder::new().push_int(n);
    for key in keys {
        builder = builder.push_key(key);
    }
    builder.push_int(n).push_opcode(OP_CHECKMULTISIG).into_script()
}

/// Derives the P2SH multisig address record for a contributed key set.
///
/// Pure and deterministic: any permutation of the same keys yields the same
/// record, which is what makes concurrent finalization by several notaries an
/// idempotent rewrite on the ledger.
pub fn derive_multisig_address(keys: Vec<PublicKey>, kind: AddressKind, network: Network) -> Result<AddressRecord> {
    if keys.is_empty() {
        return Err(BridgeError::Message("cannot derive a multisig address from zero keys".to_string()));
    }
    if keys.len() > MAX_MULTISIG_KEYS {
        return Err(BridgeError::TooManyKeys { count: keys.len(), max: MAX_MULTISIG_KEYS });
    }

    let sorted = sort_keys(keys);
    let script = multisig_script(&sorted);
    let address = Address::p2sh(&script, network).map_err(|err| BridgeError::InvalidAddress(err.to_string()))?;

    Ok(AddressRecord {
        address: address.to_string(),
        kind,
        public_keys: sorted.iter().map(|key| key.to_string()).collect(),
        threshold: sorted.len(),
        redeem_script: hex::encode(script.as_bytes()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use secp256k1::rand::rngs::StdRng;
    use secp256k1::rand::SeedableRng;
    use secp256k1::Secp256k1;

    fn test_keys(count: usize) -> Vec<PublicKey> {
        let secp = Secp256k1::new();
        let mut rng = StdRng::seed_from_u64(7);
        (0..count).map(|_| PublicKey::new(secp.generate_keypair(&mut rng).1)).collect()
    }

    #[test]
    fn derivation_is_order_independent() {
        let keys = test_keys(3);
        let mut reversed = keys.clone();
        reversed.reverse();

        let a = derive_multisig_address(keys, AddressKind::Free, Network::Regtest).expect("derive");
        let b = derive_multisig_address(reversed, AddressKind::Free, Network::Regtest).expect("derive reversed");
        assert_eq!(a, b);
        assert_eq!(a.threshold, 3);
        assert_eq!(a.public_keys.len(), 3);
    }

    #[test]
    fn derivation_is_idempotent() {
        let keys = test_keys(4);
        let a = derive_multisig_address(keys.clone(), AddressKind::Change, Network::Regtest).expect("derive");
        let b = derive_multisig_address(keys, AddressKind::Change, Network::Regtest).expect("derive again");
        assert_eq!(a.address, b.address);
        assert_eq!(a.redeem_script, b.redeem_script);
    }

    #[test]
    fn single_key_session_still_derives() {
        let record = derive_multisig_address(test_keys(1), AddressKind::Free, Network::Regtest).expect("derive");
        assert_eq!(record.threshold, 1);
    }

    #[test]
    fn rejects_empty_and_oversized_key_sets() {
        assert!(derive_multisig_address(Vec::new(), AddressKind::Free, Network::Regtest).is_err());
        let err = derive_multisig_address(test_keys(MAX_MULTISIG_KEYS + 1), AddressKind::Free, Network::Regtest)
            .expect_err("too many keys");
        assert!(matches!(err, BridgeError::TooManyKeys { .. }));
    }

    #[test]
    fn parse_public_key_rejects_garbage() {
        assert!(parse_public_key("not-a-key").is_err());
        let keys = test_keys(1);
        let round = parse_public_key(&keys[0].to_string()).expect("round trip");
        assert_eq!(round, keys[0]);
    }
}
