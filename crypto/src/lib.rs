//! Cryptographic primitives for the Strata ledger.
//!
//! - **Ed25519** for transaction and channel-state signatures
//! - **Blake2b-256** with domain separation for every ledger hash
//! - **Merkle trees** for sub-block roots and plasma batch commitments

pub mod error;
pub mod hash;
pub mod keys;
pub mod merkle;
pub mod sign;
pub mod verifier;

pub use error::CryptoError;
pub use hash::{blake2b_256, blake2b_256_multi, domain, domain_hash};
pub use keys::{generate_keypair, keypair_from_seed, public_from_private};
pub use merkle::{merkle_root, verify_proof, Direction, MerkleProof, MerkleTree};
pub use sign::{sign_message, verify_signature};
pub use verifier::{Ed25519Verifier, SignatureVerifier};
