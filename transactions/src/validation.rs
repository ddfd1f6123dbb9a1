//! Transaction validation that needs no ledger state.
//!
//! Balance and account checks live in the ledger, which calls into these
//! helpers first.

use strata_crypto::SignatureVerifier;
use strata_types::{PublicKey, Timestamp};

use crate::error::ValidationError;
use crate::Transaction;

/// Structural checks: positive amount, canonical id, no overflow, fresh timestamp.
///
/// A timestamp is fresh when it lies in `[now - staleness_window_secs, now]`.
pub fn validate_stateless(
    tx: &Transaction,
    now: Timestamp,
    staleness_window_secs: u64,
) -> Result<(), ValidationError> {
    if tx.amount.is_zero() {
        return Err(ValidationError::ZeroAmount);
    }

    let expected = tx.canonical_id();
    if tx.id != expected {
        return Err(ValidationError::IdMismatch {
            expected,
            actual: tx.id,
        });
    }

    if tx.total_debit().is_none() {
        return Err(ValidationError::AmountOverflow);
    }

    check_freshness(tx.timestamp, now, staleness_window_secs)
}

pub fn check_freshness(
    timestamp: Timestamp,
    now: Timestamp,
    staleness_window_secs: u64,
) -> Result<(), ValidationError> {
    let too_new = timestamp > now;
    let too_old = timestamp.elapsed_since(now) > staleness_window_secs;
    if too_new || too_old {
        return Err(ValidationError::StaleTimestamp {
            timestamp,
            now,
            window_secs: staleness_window_secs,
        });
    }
    Ok(())
}

/// Check the sender's signature over the canonical encoding.
pub fn verify_transaction_signature(
    tx: &Transaction,
    sender_key: &PublicKey,
    verifier: &dyn SignatureVerifier,
) -> Result<(), ValidationError> {
    if verifier.verify(sender_key, &tx.signing_bytes(), &tx.signature) {
        Ok(())
    } else {
        Err(ValidationError::InvalidSignature(tx.id))
    }
}
