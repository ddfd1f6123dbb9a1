//! Parallel signature re-verification shared by sub-block close and block
//! validation.

use rayon::prelude::*;
use strata_crypto::SignatureVerifier;
use strata_ledger::LedgerState;
use strata_transactions::Transaction;
use strata_types::PublicKey;

use crate::error::ConsensusError;

/// Verify every transaction's signature against its sender's registered key.
///
/// Keys are looked up sequentially, then signatures are checked across the
/// rayon pool. Reports the earliest failing transaction in input order.
pub fn verify_signatures<'a, I>(
    txs: I,
    ledger: &LedgerState,
    verifier: &dyn SignatureVerifier,
) -> Result<(), ConsensusError>
where
    I: IntoIterator<Item = &'a Transaction>,
{
    let keyed: Vec<(&Transaction, PublicKey)> = txs
        .into_iter()
        .map(|tx| Ok((tx, ledger.public_key(&tx.from)?)))
        .collect::<Result<_, ConsensusError>>()?;

    let failed = keyed
        .par_iter()
        .find_first(|(tx, key)| !verifier.verify(key, &tx.signing_bytes(), &tx.signature));

    match failed {
        Some((tx, _)) => Err(ConsensusError::InvalidSignature(tx.id)),
        None => Ok(()),
    }
}
