//! Fund locks: value held out of an account's available balance.
//!
//! Escrows, channel collateral and child-chain exits all lock value the same
//! way. A lock ends either by release (value becomes available again) or by
//! consumption (value leaves the ledger).

use strata_types::{AccountId, Amount, LockId, Timestamp};
use tracing::debug;

use crate::account::{FundLock, LockPurpose};
use crate::error::LedgerError;
use crate::state::LedgerState;

impl LedgerState {
    pub fn lock_funds(
        &mut self,
        account: &AccountId,
        amount: Amount,
        purpose: LockPurpose,
        now: Timestamp,
    ) -> Result<LockId, LedgerError> {
        if amount.is_zero() {
            return Err(LedgerError::ZeroAmount);
        }
        let acc = self.account_mut(account)?;
        let available = acc.available();
        if available < amount {
            return Err(LedgerError::InsufficientFunds {
                account: account.clone(),
                needed: amount,
                available,
            });
        }
        acc.locked = acc.locked.checked_add(amount).ok_or(LedgerError::Overflow)?;

        let id = self.next_lock;
        self.next_lock = id.next();
        self.locks.insert(
            id,
            FundLock {
                id,
                account: account.clone(),
                amount,
                purpose,
                created_at: now,
            },
        );
        debug!(lock = %id, %account, %amount, "funds locked");
        Ok(id)
    }

    pub fn get_lock(&self, id: LockId) -> Option<&FundLock> {
        self.locks.get(&id)
    }

    pub fn active_locks(&self) -> impl Iterator<Item = &FundLock> {
        self.locks.values()
    }

    /// End a lock, returning its value to the available balance.
    pub fn release_lock(&mut self, id: LockId) -> Result<FundLock, LedgerError> {
        let lock = self.locks.remove(&id).ok_or(LedgerError::UnknownLock(id))?;
        let acc = self.account_mut(&lock.account)?;
        acc.locked = acc.locked.saturating_sub(lock.amount);
        debug!(lock = %id, account = %lock.account, amount = %lock.amount, "lock released");
        Ok(lock)
    }

    /// End a lock by removing its value from the ledger entirely.
    pub fn consume_lock(&mut self, id: LockId) -> Result<FundLock, LedgerError> {
        let lock = self.locks.get(&id).ok_or(LedgerError::UnknownLock(id))?;
        let amount = lock.amount;
        let account = lock.account.clone();
        let withdrawn = self.withdrawn.checked_add(amount).ok_or(LedgerError::Overflow)?;

        let acc = self.account_mut(&account)?;
        acc.locked = acc.locked.saturating_sub(amount);
        acc.balance = acc.balance.saturating_sub(amount);
        self.withdrawn = withdrawn;
        debug!(lock = %id, %account, %amount, "lock consumed");
        self.locks.remove(&id).ok_or(LedgerError::UnknownLock(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::tests::{id, ledger};

    const NOW: Timestamp = Timestamp::EPOCH;

    #[test]
    fn lock_reduces_available_only() {
        let mut l = ledger();
        l.lock_funds(&id("alice"), Amount::new(40), LockPurpose::Escrow, NOW)
            .unwrap();
        assert_eq!(l.get_balance(&id("alice")).unwrap(), Amount::new(100));
        assert_eq!(l.get_available_balance(&id("alice")).unwrap(), Amount::new(60));
    }

    #[test]
    fn lock_beyond_available_rejected() {
        let mut l = ledger();
        l.lock_funds(&id("alice"), Amount::new(70), LockPurpose::Escrow, NOW)
            .unwrap();
        assert!(matches!(
            l.lock_funds(&id("alice"), Amount::new(31), LockPurpose::ChannelCollateral, NOW),
            Err(LedgerError::InsufficientFunds { .. })
        ));
    }

    #[test]
    fn zero_lock_rejected() {
        let mut l = ledger();
        assert_eq!(
            l.lock_funds(&id("alice"), Amount::ZERO, LockPurpose::Escrow, NOW),
            Err(LedgerError::ZeroAmount)
        );
    }

    #[test]
    fn release_restores_available() {
        let mut l = ledger();
        let lock = l
            .lock_funds(&id("alice"), Amount::new(40), LockPurpose::Escrow, NOW)
            .unwrap();
        let released = l.release_lock(lock).unwrap();
        assert_eq!(released.amount, Amount::new(40));
        assert_eq!(l.get_available_balance(&id("alice")).unwrap(), Amount::new(100));
        assert_eq!(l.release_lock(lock), Err(LedgerError::UnknownLock(lock)));
    }

    #[test]
    fn consume_withdraws_value() {
        let mut l = ledger();
        let before = l.total_value();
        let lock = l
            .lock_funds(&id("alice"), Amount::new(40), LockPurpose::ChildChainExit, NOW)
            .unwrap();
        l.consume_lock(lock).unwrap();
        assert_eq!(l.get_balance(&id("alice")).unwrap(), Amount::new(60));
        assert_eq!(l.get_available_balance(&id("alice")).unwrap(), Amount::new(60));
        assert_eq!(l.withdrawn(), Amount::new(40));
        assert_eq!(l.total_value(), before);
    }
}
