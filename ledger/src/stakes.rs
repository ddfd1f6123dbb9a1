//! Validator stakes and the reward/punishment audit ledgers.
//!
//! Stakes are bookkeeping supplied by the external validator-selection
//! process. Rewards and punishments are append-only records; they never
//! move balances themselves. Any payout is an explicit `transfer`.

use serde::{Deserialize, Serialize};
use strata_types::{AccountId, Amount, Timestamp, ValidatorId};
use tracing::info;

use crate::error::LedgerError;
use crate::state::LedgerState;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardEntry {
    pub account: AccountId,
    pub amount: Amount,
    pub reason: String,
    pub recorded_at: Timestamp,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PunishmentEntry {
    pub validator: ValidatorId,
    pub amount: Amount,
    pub reason: String,
    pub recorded_at: Timestamp,
}

impl LedgerState {
    pub fn stake_of(&self, validator: &ValidatorId) -> Amount {
        self.stakes.get(validator).copied().unwrap_or(Amount::ZERO)
    }

    /// Apply a signed change to a validator's stake.
    pub fn record_stake_change(
        &mut self,
        validator: &ValidatorId,
        delta: i128,
    ) -> Result<Amount, LedgerError> {
        let current = self.stake_of(validator);
        let magnitude = Amount::new(delta.unsigned_abs());
        let updated = if delta >= 0 {
            current.checked_add(magnitude).ok_or(LedgerError::Overflow)?
        } else {
            current
                .checked_sub(magnitude)
                .ok_or_else(|| LedgerError::NegativeStake {
                    validator: validator.clone(),
                    current,
                    delta,
                })?
        };
        self.stakes.insert(validator.clone(), updated);
        Ok(updated)
    }

    pub fn record_reward(
        &mut self,
        account: AccountId,
        amount: Amount,
        reason: impl Into<String>,
        now: Timestamp,
    ) {
        let reason = reason.into();
        info!(%account, %amount, %reason, "reward recorded");
        self.rewards.push(RewardEntry {
            account,
            amount,
            reason,
            recorded_at: now,
        });
    }

    pub fn record_punishment(
        &mut self,
        validator: ValidatorId,
        amount: Amount,
        reason: impl Into<String>,
        now: Timestamp,
    ) {
        let reason = reason.into();
        info!(%validator, %amount, %reason, "punishment recorded");
        self.punishments.push(PunishmentEntry {
            validator,
            amount,
            reason,
            recorded_at: now,
        });
    }

    pub fn rewards(&self) -> &[RewardEntry] {
        &self.rewards
    }

    pub fn punishments(&self) -> &[PunishmentEntry] {
        &self.punishments
    }
}
