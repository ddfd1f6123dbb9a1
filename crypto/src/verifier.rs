//! Signature verification seam.
//!
//! Components that check signatures take a `SignatureVerifier` so the
//! verification step is explicit at every call site and can be swapped for
//! a counting wrapper in tests.

use strata_types::{PublicKey, Signature};

use crate::sign::verify_signature;

pub trait SignatureVerifier: Send + Sync {
    fn verify(&self, public_key: &PublicKey, message: &[u8], signature: &Signature) -> bool;
}

/// Real Ed25519 verification.
#[derive(Clone, Copy, Debug, Default)]
pub struct Ed25519Verifier;

impl SignatureVerifier for Ed25519Verifier {
    fn verify(&self, public_key: &PublicKey, message: &[u8], signature: &Signature) -> bool {
        verify_signature(message, signature, public_key)
    }
}
