//! Address helpers: compressed secp256k1 key → EVM address, and the
//! lower-case `0x` normal form used for every stored address and hash.

use k256::elliptic_curve::sec1::ToEncodedPoint;
use k256::PublicKey;
use tiny_keccak::{Hasher, Keccak};

use crate::error::IndexerError;

/// Length of a SEC1 compressed secp256k1 public key.
pub const COMPRESSED_PUBKEY_LEN: usize = 33;

/// Derive the EVM address of a 33-byte compressed secp256k1 public key.
///
/// The key is decompressed, the 64-byte `X || Y` point is hashed with
/// keccak-256 and the last 20 bytes are returned as lower-case `0x` hex.
pub fn cmp_pubkey_to_evm_address(pubkey: &[u8]) -> Result<String, IndexerError> {
    if pubkey.len() != COMPRESSED_PUBKEY_LEN {
        return Err(IndexerError::InvalidPubkey(format!(
            "invalid compressed public key length: {}",
            pubkey.len()
        )));
    }

    let key = PublicKey::from_sec1_bytes(pubkey)
        .map_err(|e| IndexerError::InvalidPubkey(format!("failed to decompress public key: {e}")))?;
    let point = key.to_encoded_point(false);
    // Uncompressed SEC1 encoding is 0x04 || X || Y.
    let hash = keccak256(&point.as_bytes()[1..]);

    Ok(format!("0x{}", hex::encode(&hash[12..])))
}

/// Same as [`cmp_pubkey_to_evm_address`] for a hex-encoded key (with or
/// without `0x`), as carried by consensus-chain event attributes.
pub fn cmp_pubkey_hex_to_evm_address(pubkey_hex: &str) -> Result<String, IndexerError> {
    let raw = pubkey_hex.strip_prefix("0x").unwrap_or(pubkey_hex);
    let bytes = hex::decode(raw)
        .map_err(|e| IndexerError::InvalidPubkey(format!("invalid hex: {e}")))?;
    cmp_pubkey_to_evm_address(&bytes)
}

/// Lower-case and `0x`-prefix an address or hash. Empty input stays empty.
pub fn normalize_hex(value: &str) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return String::new();
    }
    let body = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    format!("0x{}", body.to_ascii_lowercase())
}

/// Case-insensitive address comparison tolerant of a missing `0x` prefix.
pub fn same_address(a: &str, b: &str) -> bool {
    normalize_hex(a) == normalize_hex(b)
}

fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut out = [0u8; 32];
    let mut k = Keccak::v256();
    k.update(data);
    k.finalize(&mut out);
    out
}
