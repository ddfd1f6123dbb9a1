//! Distribution of collected transaction fees.

use strata_types::{AccountId, Amount, TxHash, TxStatus};
use tracing::debug;

use crate::error::LedgerError;
use crate::state::LedgerState;

impl LedgerState {
    /// Fee still held for `id`, if any was collected.
    pub fn held_fee(&self, id: &TxHash) -> Option<Amount> {
        self.held_fees.get(id).copied()
    }

    /// Credit each participant its share of the fee held for `id`.
    ///
    /// Only finalized (or spent) transactions can have their fee
    /// distributed. The shares may leave a remainder, which stays held for
    /// a later call; they may not exceed it.
    pub fn distribute_fees(
        &mut self,
        id: &TxHash,
        shares: &[(AccountId, Amount)],
    ) -> Result<(), LedgerError> {
        let remaining = self
            .held_fees
            .get(id)
            .copied()
            .ok_or(LedgerError::UnknownTransaction(*id))?;
        if let Some(record) = self.tx_cache.get(id) {
            if !record.tx.status.is_final() {
                return Err(LedgerError::UnexpectedTxStatus {
                    id: *id,
                    status: record.tx.status,
                    expected: TxStatus::Finalized,
                });
            }
        }

        let requested = Amount::checked_sum(shares.iter().map(|(_, a)| *a))
            .ok_or(LedgerError::Overflow)?;
        if requested > remaining {
            return Err(LedgerError::FeeSharesExceedCollected {
                id: *id,
                requested,
                remaining,
            });
        }
        for (account, share) in shares {
            self.account(account)?
                .balance
                .checked_add(*share)
                .ok_or(LedgerError::Overflow)?;
        }

        for (account, share) in shares {
            let acc = self.account_mut(account)?;
            acc.balance = acc.balance.checked_add(*share).ok_or(LedgerError::Overflow)?;
        }
        let left = remaining.saturating_sub(requested);
        if left.is_zero() {
            self.held_fees.remove(id);
        } else {
            self.held_fees.insert(*id, left);
        }
        debug!(tx = %id, distributed = %requested, remaining = %left, "fees distributed");
        Ok(())
    }
}
