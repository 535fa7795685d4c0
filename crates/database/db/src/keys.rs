//! Key layout of the store.
//!
//! Hash-indexed keys are the prefix followed by the raw 32 hash bytes. Number-indexed keys are
//! the prefix followed by the decimal string of the height, so numbers do not sort
//! lexicographically and must never be range scanned.

use alloy_primitives::B256;

/// Prefix of batch headers by hash.
pub const BATCH_HEADER_PREFIX: &[u8] = b"bh|";
/// Prefix of batch hashes by number.
pub const BATCH_NUMBER_PREFIX: &[u8] = b"bn|";
/// Prefix of batch bodies by hash.
pub const BATCH_BODY_PREFIX: &[u8] = b"bb|";
/// Prefix of rollup headers by hash.
pub const ROLLUP_HEADER_PREFIX: &[u8] = b"rh|";
/// Prefix of rollup hashes by number.
pub const ROLLUP_NUMBER_PREFIX: &[u8] = b"rn|";
/// Prefix of the batch hashes of a rollup by rollup hash.
pub const ROLLUP_BODY_PREFIX: &[u8] = b"rb|";
/// The head batch pointer.
pub const HEAD_BATCH_KEY: &[u8] = b"head-batch";
/// The head rollup pointer.
pub const HEAD_ROLLUP_KEY: &[u8] = b"head-rollup";
/// The last fully processed L1 block.
pub const L1_PROCESSED_KEY: &[u8] = b"l1-processed";

fn with_hash(prefix: &[u8], hash: &B256) -> Vec<u8> {
    [prefix, hash.as_slice()].concat()
}

fn with_number(prefix: &[u8], number: u64) -> Vec<u8> {
    [prefix, number.to_string().as_bytes()].concat()
}

/// Returns the key of the batch header with the provided hash.
pub fn batch_header(hash: &B256) -> Vec<u8> {
    with_hash(BATCH_HEADER_PREFIX, hash)
}

/// Returns the key of the canonical batch hash at the provided height.
pub fn batch_number(number: u64) -> Vec<u8> {
    with_number(BATCH_NUMBER_PREFIX, number)
}

/// Returns the key of the batch body with the provided hash.
pub fn batch_body(hash: &B256) -> Vec<u8> {
    with_hash(BATCH_BODY_PREFIX, hash)
}

/// Returns the key of the rollup header with the provided hash.
pub fn rollup_header(hash: &B256) -> Vec<u8> {
    with_hash(ROLLUP_HEADER_PREFIX, hash)
}

/// Returns the key of the canonical rollup hash at the provided height.
pub fn rollup_number(number: u64) -> Vec<u8> {
    with_number(ROLLUP_NUMBER_PREFIX, number)
}

/// Returns the key of the rollup batch list with the provided hash.
pub fn rollup_body(hash: &B256) -> Vec<u8> {
    with_hash(ROLLUP_BODY_PREFIX, hash)
}

/// Returns a printable representation of a key for logs and errors.
pub(crate) fn display(key: &[u8]) -> String {
    match key.iter().position(|b| *b == b'|') {
        Some(pos) if key.len() - pos - 1 == 32 => {
            format!("{}{}", String::from_utf8_lossy(&key[..=pos]), B256::from_slice(&key[pos + 1..]))
        }
        _ => String::from_utf8_lossy(key).into_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_number_keys_use_decimal() {
        assert_eq!(batch_number(10), b"bn|10".to_vec());
        assert_eq!(rollup_number(0), b"rn|0".to_vec());
    }

    #[test]
    fn test_hash_keys_use_raw_bytes() {
        let hash = B256::with_last_byte(1);
        let key = batch_header(&hash);
        assert_eq!(key.len(), 3 + 32);
        assert_eq!(&key[..3], b"bh|");
        assert_eq!(display(&key), format!("bh|{hash}"));
    }
}
