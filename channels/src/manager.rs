//! Channel manager: the on-ledger side of state channels.
//!
//! Collateral is locked when a channel opens. Updates happen off-ledger and
//! are only checked here. Closing either settles at once (a final state
//! co-signed by everyone) or starts a dispute window during which any
//! co-signed state with a higher version replaces the pending one.
//! Settlement releases the collateral locks and reconciles balances with
//! ordinary transfers.

use std::collections::BTreeMap;

use strata_crypto::SignatureVerifier;
use strata_ledger::{LedgerState, LockPurpose};
use strata_types::{AccountId, Amount, ChainParams, ChannelId, PublicKey, Timestamp};
use tracing::{debug, info, warn};

use crate::channel::{ChannelStatus, Collateral, PendingClose, Settlement, StateChannel};
use crate::error::ChannelError;
use crate::state::{ChannelState, SignedState};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChannelConfig {
    pub dispute_window_secs: u64,
}

impl From<&ChainParams> for ChannelConfig {
    fn from(params: &ChainParams) -> Self {
        Self {
            dispute_window_secs: params.channel_dispute_window_secs,
        }
    }
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self::from(&ChainParams::default())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CloseOutcome {
    Settled(Settlement),
    Pending { closes_at: Timestamp },
}

#[derive(Debug)]
pub struct ChannelManager {
    config: ChannelConfig,
    channels: BTreeMap<ChannelId, StateChannel>,
    next_id: u64,
}

impl ChannelManager {
    pub fn new(config: ChannelConfig) -> Self {
        Self {
            config,
            channels: BTreeMap::new(),
            next_id: 1,
        }
    }

    pub fn get_channel(&self, id: ChannelId) -> Option<&StateChannel> {
        self.channels.get(&id)
    }

    pub fn channels(&self) -> impl Iterator<Item = &StateChannel> {
        self.channels.values()
    }

    /// Open a channel, locking each participant's collateral. Either every
    /// lock is taken or none is.
    pub fn open_channel(
        &mut self,
        ledger: &mut LedgerState,
        collateral: Vec<(AccountId, Amount)>,
        now: Timestamp,
    ) -> Result<ChannelId, ChannelError> {
        if collateral.len() < 2 {
            return Err(ChannelError::TooFewParticipants(collateral.len()));
        }
        let mut participants: Vec<AccountId> = Vec::with_capacity(collateral.len());
        for (account, _) in &collateral {
            if participants.contains(account) {
                return Err(ChannelError::DuplicateParticipant(account.clone()));
            }
            participants.push(account.clone());
        }
        let total = Amount::checked_sum(collateral.iter().map(|(_, amount)| *amount))
            .ok_or(ChannelError::Overflow)?;

        let mut locked: BTreeMap<AccountId, Collateral> = BTreeMap::new();
        for (account, amount) in &collateral {
            let lock = if amount.is_zero() {
                None
            } else {
                match ledger.lock_funds(account, *amount, LockPurpose::ChannelCollateral, now) {
                    Ok(lock) => Some(lock),
                    Err(e) => {
                        for taken in locked.values().filter_map(|c| c.lock) {
                            if let Err(release) = ledger.release_lock(taken) {
                                warn!(lock = %taken, error = %release, "collateral rollback failed");
                            }
                        }
                        return Err(e.into());
                    }
                }
            };
            locked.insert(
                account.clone(),
                Collateral {
                    amount: *amount,
                    lock,
                },
            );
        }

        let id = ChannelId::new(self.next_id);
        self.next_id = id.raw() + 1;
        let balances = collateral.into_iter().collect();
        self.channels.insert(
            id,
            StateChannel {
                id,
                participants,
                collateral: locked,
                total_collateral: total,
                state_version: 0,
                latest: ChannelState::new(id, 0, balances),
                status: ChannelStatus::Open,
                opened_at: now,
                pending_close: None,
                closed_at: None,
            },
        );
        info!(channel = %id, %total, "channel opened");
        Ok(id)
    }

    /// Record an off-chain state update. The state must be co-signed by
    /// every participant and supersede the latest version. Ledger balances
    /// are not touched.
    pub fn update(
        &mut self,
        ledger: &LedgerState,
        id: ChannelId,
        signed: &SignedState,
        verifier: &dyn SignatureVerifier,
    ) -> Result<u64, ChannelError> {
        let channel = self.channel(id)?;
        if !matches!(channel.status, ChannelStatus::Open | ChannelStatus::Active) {
            return Err(ChannelError::InvalidStatus {
                id,
                status: channel.status,
            });
        }
        if channel.is_closing() {
            return Err(ChannelError::AlreadyClosing(id));
        }
        check_state(channel, &signed.state, channel.state_version + 1)?;
        signed.signed_by_all(channel.participants.iter())?;
        verify(ledger, channel, signed, verifier)?;

        let version = signed.state.version;
        let channel = self.channel_mut(id)?;
        channel.latest = signed.state.clone();
        channel.state_version = version;
        channel.status = ChannelStatus::Active;
        debug!(channel = %id, version, "channel state updated");
        Ok(version)
    }

    /// Close with `final_state`, which may not be older than anything seen.
    /// A final state co-signed by everyone settles immediately; anything else
    /// waits out the dispute window. A close signed by only some of the
    /// participants must repeat the latest co-signed state.
    pub fn close_channel(
        &mut self,
        ledger: &mut LedgerState,
        id: ChannelId,
        final_state: &SignedState,
        now: Timestamp,
        verifier: &dyn SignatureVerifier,
    ) -> Result<CloseOutcome, ChannelError> {
        let channel = self.channel(id)?;
        if !matches!(channel.status, ChannelStatus::Open | ChannelStatus::Active) {
            return Err(ChannelError::InvalidStatus {
                id,
                status: channel.status,
            });
        }
        if channel.is_closing() {
            return Err(ChannelError::AlreadyClosing(id));
        }
        check_state(channel, &final_state.state, channel.state_version)?;
        if final_state.signatures.is_empty() {
            return Err(ChannelError::Unsigned);
        }
        verify(ledger, channel, final_state, verifier)?;

        let co_signed = final_state.signed_by_all(channel.participants.iter()).is_ok();
        // One signature only vouches for a state everyone already agreed to.
        if !co_signed
            && (final_state.state.version != channel.latest.version
                || final_state.state.balances != channel.latest.balances)
        {
            return Err(ChannelError::NotLatestState {
                latest: channel.latest.version,
            });
        }
        let cooperative = co_signed && final_state.state.is_final;
        let state = final_state.state.clone();

        if cooperative {
            let settlement = self.settle(ledger, id, state, now)?;
            return Ok(CloseOutcome::Settled(settlement));
        }

        let closes_at = now.plus(self.config.dispute_window_secs);
        let channel = self.channel_mut(id)?;
        channel.state_version = state.version;
        channel.latest = state.clone();
        channel.pending_close = Some(PendingClose {
            state,
            requested_at: now,
            closes_at,
        });
        info!(channel = %id, %closes_at, "channel close pending");
        Ok(CloseOutcome::Pending { closes_at })
    }

    /// Replace a pending close with a co-signed state of higher version.
    /// The dispute window keeps its original deadline.
    pub fn dispute(
        &mut self,
        ledger: &LedgerState,
        id: ChannelId,
        counter: &SignedState,
        now: Timestamp,
        verifier: &dyn SignatureVerifier,
    ) -> Result<(), ChannelError> {
        let channel = self.channel(id)?;
        let pending = channel
            .pending_close
            .as_ref()
            .ok_or(ChannelError::NoPendingClose(id))?;
        if now >= pending.closes_at {
            return Err(ChannelError::DisputeWindowClosed(id));
        }
        check_state(channel, &counter.state, pending.state.version + 1)?;
        counter.signed_by_all(channel.participants.iter())?;
        verify(ledger, channel, counter, verifier)?;

        let version = counter.state.version;
        let channel = self.channel_mut(id)?;
        if let Some(pending) = channel.pending_close.as_mut() {
            pending.state = counter.state.clone();
        }
        channel.latest = counter.state.clone();
        channel.state_version = version;
        channel.status = ChannelStatus::Disputed;
        warn!(channel = %id, version, "channel close disputed");
        Ok(())
    }

    /// Settle every pending close whose dispute window has passed.
    pub fn process_expired_channels(
        &mut self,
        ledger: &mut LedgerState,
        now: Timestamp,
    ) -> Vec<Settlement> {
        let due: Vec<(ChannelId, ChannelState)> = self
            .channels
            .values()
            .filter_map(|c| {
                c.pending_close
                    .as_ref()
                    .filter(|p| now >= p.closes_at)
                    .map(|p| (c.id, p.state.clone()))
            })
            .collect();

        let mut settled = Vec::with_capacity(due.len());
        for (id, state) in due {
            match self.settle(ledger, id, state, now) {
                Ok(settlement) => settled.push(settlement),
                Err(e) => warn!(channel = %id, error = %e, "channel settlement failed"),
            }
        }
        settled
    }

    fn settle(
        &mut self,
        ledger: &mut LedgerState,
        id: ChannelId,
        state: ChannelState,
        now: Timestamp,
    ) -> Result<Settlement, ChannelError> {
        let channel = self.channel(id)?;

        let mut payers: Vec<(AccountId, Amount)> = Vec::new();
        let mut payees: Vec<(AccountId, Amount)> = Vec::new();
        for (account, collateral) in &channel.collateral {
            let end = state.balances.get(account).copied().unwrap_or(Amount::ZERO);
            if end < collateral.amount {
                payers.push((account.clone(), collateral.amount.saturating_sub(end)));
            } else if end > collateral.amount {
                payees.push((account.clone(), end.saturating_sub(collateral.amount)));
            }
        }
        let locks: Vec<_> = channel.collateral.values().filter_map(|c| c.lock).collect();

        for lock in locks {
            ledger.release_lock(lock)?;
        }

        // Pair payers with payees until every debt is covered.
        let mut transfers = Vec::new();
        let (mut i, mut j) = (0, 0);
        while i < payers.len() && j < payees.len() {
            let amount = payers[i].1.min(payees[j].1);
            ledger.transfer(&payers[i].0, &payees[j].0, amount, Amount::ZERO)?;
            transfers.push((payers[i].0.clone(), payees[j].0.clone(), amount));
            payers[i].1 = payers[i].1.saturating_sub(amount);
            payees[j].1 = payees[j].1.saturating_sub(amount);
            if payers[i].1.is_zero() {
                i += 1;
            }
            if payees[j].1.is_zero() {
                j += 1;
            }
        }

        let channel = self.channel_mut(id)?;
        channel.latest = state.clone();
        channel.state_version = state.version;
        channel.pending_close = None;
        channel.status = ChannelStatus::Closed;
        channel.closed_at = Some(now);
        info!(channel = %id, version = state.version, transfers = transfers.len(), "channel settled");
        Ok(Settlement {
            channel: id,
            version: state.version,
            balances: state.balances,
            transfers,
        })
    }

    fn channel(&self, id: ChannelId) -> Result<&StateChannel, ChannelError> {
        self.channels.get(&id).ok_or(ChannelError::UnknownChannel(id))
    }

    fn channel_mut(&mut self, id: ChannelId) -> Result<&mut StateChannel, ChannelError> {
        self.channels.get_mut(&id).ok_or(ChannelError::UnknownChannel(id))
    }
}

/// Structural checks shared by update, close and dispute.
fn check_state(
    channel: &StateChannel,
    state: &ChannelState,
    min_version: u64,
) -> Result<(), ChannelError> {
    if state.channel != channel.id {
        return Err(ChannelError::WrongChannel {
            expected: channel.id,
            got: state.channel,
        });
    }
    if state.version < min_version {
        return Err(ChannelError::StaleVersion {
            current: channel.state_version,
            got: state.version,
        });
    }
    if state.balances.len() != channel.participants.len()
        || !state.balances.keys().all(|a| channel.is_participant(a))
    {
        return Err(ChannelError::ParticipantMismatch);
    }
    let total = state.total().ok_or(ChannelError::Overflow)?;
    if total != channel.total_collateral {
        return Err(ChannelError::BalanceMismatch {
            expected: channel.total_collateral,
            got: total,
        });
    }
    Ok(())
}

fn verify(
    ledger: &LedgerState,
    channel: &StateChannel,
    signed: &SignedState,
    verifier: &dyn SignatureVerifier,
) -> Result<(), ChannelError> {
    let key_of = |account: &AccountId| -> Result<PublicKey, ChannelError> {
        if !channel.is_participant(account) {
            return Err(ChannelError::UnknownParticipant(account.clone()));
        }
        Ok(ledger.public_key(account)?)
    };
    signed.verify_attached(key_of, verifier)
}
