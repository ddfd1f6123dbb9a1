//! Buyer/seller escrow backed by a fund lock.
//!
//! `Locked → Released` on release, `Locked → Disputed` on dispute, and a
//! disputed escrow waits for an external resolution that either releases to
//! the seller or refunds the buyer.

use serde::{Deserialize, Serialize};
use strata_types::{AccountId, Amount, EscrowId, LockId, Timestamp};
use tracing::info;

use crate::account::LockPurpose;
use crate::error::LedgerError;
use crate::state::LedgerState;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EscrowStatus {
    Locked,
    Disputed,
    Released,
    Refunded,
}

/// Outcome of an external dispute resolution.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EscrowResolution {
    ReleaseToSeller,
    RefundBuyer,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Escrow {
    pub id: EscrowId,
    pub buyer: AccountId,
    pub seller: AccountId,
    /// Opaque reference to what is being bought.
    pub resource: String,
    pub amount: Amount,
    pub lock: LockId,
    pub status: EscrowStatus,
    pub opened_at: Timestamp,
}

impl LedgerState {
    /// Lock `amount` of the buyer's available balance for the seller.
    pub fn open_escrow(
        &mut self,
        buyer: &AccountId,
        seller: &AccountId,
        resource: impl Into<String>,
        amount: Amount,
        now: Timestamp,
    ) -> Result<EscrowId, LedgerError> {
        self.account(seller)?;
        let lock = self.lock_funds(buyer, amount, LockPurpose::Escrow, now)?;

        let id = self.next_escrow;
        self.next_escrow = id.next();
        self.escrows.insert(
            id,
            Escrow {
                id,
                buyer: buyer.clone(),
                seller: seller.clone(),
                resource: resource.into(),
                amount,
                lock,
                status: EscrowStatus::Locked,
                opened_at: now,
            },
        );
        info!(escrow = %id, %buyer, %seller, %amount, "escrow opened");
        Ok(id)
    }

    pub fn get_escrow(&self, id: EscrowId) -> Option<&Escrow> {
        self.escrows.get(&id)
    }

    /// Pay the locked amount to the seller.
    pub fn release_escrow(&mut self, id: EscrowId) -> Result<(), LedgerError> {
        self.require_escrow_status(id, EscrowStatus::Locked)?;
        self.settle_escrow(id, EscrowStatus::Released)
    }

    /// Freeze the escrow until [`LedgerState::resolve_dispute`] is called.
    pub fn dispute_escrow(&mut self, id: EscrowId) -> Result<(), LedgerError> {
        self.require_escrow_status(id, EscrowStatus::Locked)?;
        if let Some(escrow) = self.escrows.get_mut(&id) {
            escrow.status = EscrowStatus::Disputed;
        }
        info!(escrow = %id, "escrow disputed");
        Ok(())
    }

    pub fn resolve_dispute(
        &mut self,
        id: EscrowId,
        resolution: EscrowResolution,
    ) -> Result<(), LedgerError> {
        self.require_escrow_status(id, EscrowStatus::Disputed)?;
        match resolution {
            EscrowResolution::ReleaseToSeller => self.settle_escrow(id, EscrowStatus::Released),
            EscrowResolution::RefundBuyer => self.settle_escrow(id, EscrowStatus::Refunded),
        }
    }

    fn require_escrow_status(
        &self,
        id: EscrowId,
        required: EscrowStatus,
    ) -> Result<(), LedgerError> {
        let escrow = self.escrows.get(&id).ok_or(LedgerError::UnknownEscrow(id))?;
        if escrow.status != required {
            return Err(LedgerError::EscrowState {
                id,
                status: escrow.status,
                required,
            });
        }
        Ok(())
    }

    fn settle_escrow(&mut self, id: EscrowId, outcome: EscrowStatus) -> Result<(), LedgerError> {
        let escrow = self.escrows.get(&id).ok_or(LedgerError::UnknownEscrow(id))?;
        let (lock, buyer, seller, amount) = (
            escrow.lock,
            escrow.buyer.clone(),
            escrow.seller.clone(),
            escrow.amount,
        );

        self.release_lock(lock)?;
        if outcome == EscrowStatus::Released {
            self.move_funds(&buyer, &seller, amount, Amount::ZERO)?;
        }
        if let Some(escrow) = self.escrows.get_mut(&id) {
            escrow.status = outcome;
        }
        info!(escrow = %id, ?outcome, "escrow settled");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::tests::{id, ledger};

    const NOW: Timestamp = Timestamp::EPOCH;

    fn open(l: &mut LedgerState, amount: u128) -> EscrowId {
        l.open_escrow(&id("alice"), &id("bob"), "listing-7", Amount::new(amount), NOW)
            .unwrap()
    }

    #[test]
    fn open_locks_available_balance() {
        let mut l = ledger();
        let e = open(&mut l, 30);
        assert_eq!(l.get_available_balance(&id("alice")).unwrap(), Amount::new(70));
        assert_eq!(l.get_escrow(e).unwrap().status, EscrowStatus::Locked);
    }

    #[test]
    fn open_beyond_available_fails() {
        let mut l = ledger();
        open(&mut l, 80);
        assert!(matches!(
            l.open_escrow(&id("alice"), &id("bob"), "x", Amount::new(21), NOW),
            Err(LedgerError::InsufficientFunds { .. })
        ));
    }

    #[test]
    fn release_pays_seller() {
        let mut l = ledger();
        let e = open(&mut l, 30);
        l.release_escrow(e).unwrap();
        assert_eq!(l.get_balance(&id("alice")).unwrap(), Amount::new(70));
        assert_eq!(l.get_balance(&id("bob")).unwrap(), Amount::new(80));
        assert_eq!(l.get_escrow(e).unwrap().status, EscrowStatus::Released);
        assert!(l.active_locks().next().is_none());
    }

    #[test]
    fn disputed_escrow_cannot_be_released() {
        let mut l = ledger();
        let e = open(&mut l, 30);
        l.dispute_escrow(e).unwrap();
        assert_eq!(
            l.release_escrow(e),
            Err(LedgerError::EscrowState {
                id: e,
                status: EscrowStatus::Disputed,
                required: EscrowStatus::Locked
            })
        );
        assert_eq!(l.get_available_balance(&id("alice")).unwrap(), Amount::new(70));
    }

    #[test]
    fn dispute_resolved_by_refund() {
        let mut l = ledger();
        let e = open(&mut l, 30);
        l.dispute_escrow(e).unwrap();
        l.resolve_dispute(e, EscrowResolution::RefundBuyer).unwrap();
        assert_eq!(l.get_available_balance(&id("alice")).unwrap(), Amount::new(100));
        assert_eq!(l.get_balance(&id("bob")).unwrap(), Amount::new(50));
        assert_eq!(l.get_escrow(e).unwrap().status, EscrowStatus::Refunded);
    }

    #[test]
    fn dispute_resolved_to_seller() {
        let mut l = ledger();
        let e = open(&mut l, 30);
        l.dispute_escrow(e).unwrap();
        l.resolve_dispute(e, EscrowResolution::ReleaseToSeller).unwrap();
        assert_eq!(l.get_balance(&id("bob")).unwrap(), Amount::new(80));
    }

    #[test]
    fn resolve_requires_dispute() {
        let mut l = ledger();
        let e = open(&mut l, 30);
        assert!(l.resolve_dispute(e, EscrowResolution::RefundBuyer).is_err());
    }
}
