//! Blake2b-256 hashing with domain separation.
//!
//! Every hash in the ledger is computed over structured fields under a
//! distinct domain tag, and every field is length-prefixed, so two different
//! field sequences can never produce the same preimage.

use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};

type Blake2b256 = Blake2b<U32>;

/// Domain tags. Changing any of these changes every hash of that kind.
pub mod domain {
    pub const TRANSACTION: &[u8] = b"strata/tx/v1";
    pub const SUB_BLOCK: &[u8] = b"strata/sub-block/v1";
    pub const BLOCK: &[u8] = b"strata/block/v1";
    pub const GENESIS: &[u8] = b"strata/genesis/v1";
    pub const MERKLE_LEAF: &[u8] = b"strata/merkle-leaf/v1";
    pub const MERKLE_NODE: &[u8] = b"strata/merkle-node/v1";
    pub const BATCH_COMMITMENT: &[u8] = b"strata/plasma-batch/v1";
    pub const CHANNEL_STATE: &[u8] = b"strata/channel-state/v1";
    pub const SNAPSHOT: &[u8] = b"strata/snapshot/v1";
}

/// Compute a 256-bit Blake2b hash of arbitrary data.
pub fn blake2b_256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Blake2b256::new();
    hasher.update(data);
    finish(hasher)
}

/// Hash multiple byte slices in sequence (avoids a concatenation allocation).
///
/// Parts are fed raw: `["ab", "c"]` and `["a", "bc"]` collide. Use
/// [`domain_hash`] for anything that identifies ledger data.
pub fn blake2b_256_multi(parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Blake2b256::new();
    for part in parts {
        hasher.update(part);
    }
    finish(hasher)
}

/// Domain-separated hash of a sequence of fields, each length-prefixed.
pub fn domain_hash(domain: &[u8], fields: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Blake2b256::new();
    hasher.update((domain.len() as u64).to_le_bytes());
    hasher.update(domain);
    for field in fields {
        hasher.update((field.len() as u64).to_le_bytes());
        hasher.update(field);
    }
    finish(hasher)
}

fn finish(hasher: Blake2b256) -> [u8; 32] {
    let result = hasher.finalize();
    let mut output = [0u8; 32];
    output.copy_from_slice(&result);
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blake2b_deterministic() {
        assert_eq!(blake2b_256(b"hello strata"), blake2b_256(b"hello strata"));
    }

    #[test]
    fn blake2b_multi_equivalent() {
        let single = blake2b_256(b"helloworld");
        let multi = blake2b_256_multi(&[b"hello", b"world"]);
        assert_eq!(single, multi);
    }

    #[test]
    fn domain_hash_separates_domains() {
        let a = domain_hash(domain::BLOCK, &[b"x"]);
        let b = domain_hash(domain::SUB_BLOCK, &[b"x"]);
        assert_ne!(a, b);
    }

    #[test]
    fn domain_hash_is_not_concatenation() {
        let a = domain_hash(domain::TRANSACTION, &[b"ab".as_slice(), b"c"]);
        let b = domain_hash(domain::TRANSACTION, &[b"a".as_slice(), b"bc"]);
        assert_ne!(a, b);
    }

    #[test]
    fn domain_hash_field_count_matters() {
        let a = domain_hash(domain::TRANSACTION, &[b"", b""]);
        let b = domain_hash(domain::TRANSACTION, &[b""]);
        assert_ne!(a, b);
    }
}
