//! Transaction validation, application and reversal against ledger state.

use strata_crypto::SignatureVerifier;
use strata_transactions::{validate_stateless, verify_transaction_signature, Transaction, ValidationError};
use strata_types::{Amount, Timestamp, TxHash, TxStatus};
use tracing::debug;

use crate::error::LedgerError;
use crate::state::{LedgerState, TxRecord};

impl LedgerState {
    /// Full validation: structure, accounts, available balance, signature
    /// and freshness. Has no side effects.
    pub fn validate(
        &self,
        tx: &Transaction,
        now: Timestamp,
        verifier: &dyn SignatureVerifier,
    ) -> Result<(), ValidationError> {
        if tx.amount.is_zero() {
            return Err(ValidationError::ZeroAmount);
        }

        let sender = self
            .accounts
            .get(&tx.from)
            .ok_or_else(|| ValidationError::UnknownAccount(tx.from.clone()))?;
        let needed = tx.total_debit().ok_or(ValidationError::AmountOverflow)?;
        let available = sender.available();
        if available < needed {
            return Err(ValidationError::InsufficientFunds { needed, available });
        }
        if !self.accounts.contains_key(&tx.to) {
            return Err(ValidationError::UnknownAccount(tx.to.clone()));
        }

        validate_stateless(tx, now, self.config.staleness_window_secs)?;
        verify_transaction_signature(tx, &sender.public_key, verifier)
    }

    /// Whether `id` is in the duplicate cache.
    pub fn contains_transaction(&self, id: &TxHash) -> bool {
        self.tx_cache.contains_key(id)
    }

    pub fn get_transaction(&self, id: &TxHash) -> Option<&Transaction> {
        self.tx_cache.get(id).map(|r| &r.tx)
    }

    pub fn tx_record(&self, id: &TxHash) -> Option<&TxRecord> {
        self.tx_cache.get(id)
    }

    pub fn tx_cache_len(&self) -> usize {
        self.tx_cache.len()
    }

    /// Insert into the duplicate cache and apply balances, in one step.
    ///
    /// The sender pays `amount + fee`; the recipient receives `amount`; the
    /// fee is held against the transaction id until distributed. The
    /// returned copy carries status `Included`.
    pub fn apply(&mut self, tx: &Transaction, now: Timestamp) -> Result<Transaction, LedgerError> {
        if self.tx_cache.contains_key(&tx.id) {
            return Err(LedgerError::DuplicateTransaction(tx.id));
        }

        self.move_funds(&tx.from, &tx.to, tx.amount, tx.fee)?;
        if !tx.fee.is_zero() {
            self.held_fees.insert(tx.id, tx.fee);
        }

        let mut applied = tx.clone();
        applied.status = TxStatus::Included;
        self.tx_cache.insert(
            tx.id,
            TxRecord {
                tx: applied.clone(),
                applied_at: now,
                finalized_at: None,
            },
        );
        debug!(tx = %tx.id, from = %tx.from, to = %tx.to, amount = %tx.amount, "transaction applied");
        Ok(applied)
    }

    /// Validate then apply.
    pub fn validate_and_apply(
        &mut self,
        tx: &Transaction,
        now: Timestamp,
        verifier: &dyn SignatureVerifier,
    ) -> Result<Transaction, LedgerError> {
        if self.tx_cache.contains_key(&tx.id) {
            return Err(LedgerError::DuplicateTransaction(tx.id));
        }
        self.validate(tx, now, verifier)?;
        self.apply(tx, now)
    }

    /// Undo an included transaction: refund the sender `amount + fee`,
    /// take `amount` back from the recipient, drop the held fee and forget
    /// the id. Finalized transactions cannot be reversed.
    ///
    /// Reversals must run newest-first when several transactions touch the
    /// same accounts, so each recipient still holds what it received. A
    /// recipient that has since locked or moved the value cannot be debited,
    /// and the reversal fails without changing anything.
    pub fn reverse(&mut self, id: &TxHash) -> Result<Transaction, LedgerError> {
        let record = self
            .tx_cache
            .get(id)
            .ok_or(LedgerError::UnknownTransaction(*id))?;
        let status = record.tx.status;
        if status != TxStatus::Included {
            return Err(LedgerError::NotReversible { id: *id, status });
        }
        let tx = record.tx.clone();
        let fee = self.held_fees.get(id).copied().unwrap_or(Amount::ZERO);

        let recipient_available = self.account(&tx.to)?.available();
        if recipient_available < tx.amount {
            return Err(LedgerError::InsufficientFunds {
                account: tx.to.clone(),
                needed: tx.amount,
                available: recipient_available,
            });
        }
        let refund = tx.amount.checked_add(fee).ok_or(LedgerError::Overflow)?;
        self.account(&tx.from)?
            .balance
            .checked_add(refund)
            .ok_or(LedgerError::Overflow)?;

        let recipient = self.account_mut(&tx.to)?;
        recipient.balance = recipient.balance.saturating_sub(tx.amount);
        let sender = self.account_mut(&tx.from)?;
        sender.balance = sender
            .balance
            .checked_add(refund)
            .ok_or(LedgerError::Overflow)?;

        self.held_fees.remove(id);
        self.tx_cache.remove(id);

        let mut reversed = tx;
        reversed.status = TxStatus::Reversed;
        debug!(tx = %id, "transaction reversed");
        Ok(reversed)
    }

    /// Mark included transactions as part of a finalized block.
    pub fn mark_finalized(&mut self, ids: &[TxHash], now: Timestamp) -> Result<(), LedgerError> {
        for id in ids {
            let record = self
                .tx_cache
                .get(id)
                .ok_or(LedgerError::UnknownTransaction(*id))?;
            if record.tx.status != TxStatus::Included {
                return Err(LedgerError::UnexpectedTxStatus {
                    id: *id,
                    status: record.tx.status,
                    expected: TxStatus::Included,
                });
            }
        }
        for id in ids {
            if let Some(record) = self.tx_cache.get_mut(id) {
                record.tx.status = TxStatus::Finalized;
                record.finalized_at = Some(now);
            }
        }
        Ok(())
    }

    /// Put an already finalized transaction back into the duplicate cache
    /// without touching balances. Used when rebuilding the cache from the
    /// block log while balances come from a snapshot.
    pub fn record_finalized(&mut self, tx: &Transaction, at: Timestamp) -> Result<(), LedgerError> {
        if self.tx_cache.contains_key(&tx.id) {
            return Err(LedgerError::DuplicateTransaction(tx.id));
        }
        let mut finalized = tx.clone();
        finalized.status = TxStatus::Finalized;
        self.tx_cache.insert(
            tx.id,
            TxRecord {
                tx: finalized,
                applied_at: at,
                finalized_at: Some(at),
            },
        );
        Ok(())
    }

    /// Mark a finalized transaction whose credited value left through an exit.
    pub fn mark_spent(&mut self, id: &TxHash) -> Result<(), LedgerError> {
        let record = self
            .tx_cache
            .get_mut(id)
            .ok_or(LedgerError::UnknownTransaction(*id))?;
        if record.tx.status != TxStatus::Finalized {
            return Err(LedgerError::UnexpectedTxStatus {
                id: *id,
                status: record.tx.status,
                expected: TxStatus::Finalized,
            });
        }
        record.tx.status = TxStatus::Spent;
        Ok(())
    }
}
