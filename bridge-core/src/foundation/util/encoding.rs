use crate::foundation::{BridgeError, Hash32};

/// Parses a 32-byte value from hex, accepting an optional `0x` prefix.
pub fn parse_hex_32bytes(s: &str) -> Result<Hash32, BridgeError> {
    let trimmed = s.trim();
    let trimmed = trimmed.strip_prefix("0x").or_else(|| trimmed.strip_prefix("0X")).unwrap_or(trimmed);
    let bytes = hex::decode(trimmed)?;
    let array: Hash32 =
        bytes.try_into().map_err(|b: Vec<u8>| BridgeError::EncodingError(format!("expected 32 bytes, got {}", b.len())))?;
    Ok(array)
}
