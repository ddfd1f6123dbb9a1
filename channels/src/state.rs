//! Off-chain channel states and their signatures.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use strata_crypto::{domain, domain_hash, sign_message, SignatureVerifier};
use strata_types::{AccountId, Amount, ChannelId, PrivateKey, PublicKey, Signature};

use crate::error::ChannelError;

/// A balance split agreed off-chain.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelState {
    pub channel: ChannelId,
    pub version: u64,
    pub balances: BTreeMap<AccountId, Amount>,
    /// Set by participants who agree this is the last state.
    pub is_final: bool,
}

impl ChannelState {
    pub fn new(channel: ChannelId, version: u64, balances: BTreeMap<AccountId, Amount>) -> Self {
        Self {
            channel,
            version,
            balances,
            is_final: false,
        }
    }

    pub fn finalized(mut self) -> Self {
        self.is_final = true;
        self
    }

    pub fn total(&self) -> Option<Amount> {
        Amount::checked_sum(self.balances.values().copied())
    }

    /// Digest every participant signs.
    pub fn digest(&self) -> [u8; 32] {
        let channel = self.channel.raw().to_le_bytes();
        let version = self.version.to_le_bytes();
        let is_final = [u8::from(self.is_final)];
        let mut fields: Vec<Vec<u8>> = vec![channel.to_vec(), version.to_vec(), is_final.to_vec()];
        for (account, balance) in &self.balances {
            fields.push(account.as_str().as_bytes().to_vec());
            fields.push(balance.raw().to_le_bytes().to_vec());
        }
        let refs: Vec<&[u8]> = fields.iter().map(Vec::as_slice).collect();
        domain_hash(domain::CHANNEL_STATE, &refs)
    }
}

/// A channel state with the signatures collected so far.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedState {
    pub state: ChannelState,
    pub signatures: BTreeMap<AccountId, Signature>,
}

impl SignedState {
    pub fn new(state: ChannelState) -> Self {
        Self {
            state,
            signatures: BTreeMap::new(),
        }
    }

    pub fn sign(mut self, account: AccountId, key: &PrivateKey) -> Self {
        let signature = sign_message(&self.state.digest(), key);
        self.signatures.insert(account, signature);
        self
    }

    /// Check every attached signature. Fails on the first bad one.
    pub fn verify_attached<F>(
        &self,
        mut key_of: F,
        verifier: &dyn SignatureVerifier,
    ) -> Result<(), ChannelError>
    where
        F: FnMut(&AccountId) -> Result<PublicKey, ChannelError>,
    {
        let digest = self.state.digest();
        for (account, signature) in &self.signatures {
            let key = key_of(account)?;
            if !verifier.verify(&key, &digest, signature) {
                return Err(ChannelError::InvalidSignature(account.clone()));
            }
        }
        Ok(())
    }

    /// Whether every account in `participants` has signed.
    pub fn signed_by_all<'a>(
        &self,
        mut participants: impl Iterator<Item = &'a AccountId>,
    ) -> Result<(), ChannelError> {
        match participants.find(|p| !self.signatures.contains_key(*p)) {
            Some(missing) => Err(ChannelError::MissingSignature(missing.clone())),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_crypto::{keypair_from_seed, Ed25519Verifier};

    fn state(version: u64, a: u128, b: u128) -> ChannelState {
        let mut balances = BTreeMap::new();
        balances.insert(AccountId::new("a"), Amount::new(a));
        balances.insert(AccountId::new("b"), Amount::new(b));
        ChannelState::new(ChannelId::new(1), version, balances)
    }

    #[test]
    fn digest_covers_version_balances_and_final_flag() {
        let base = state(1, 50, 50);
        assert_ne!(base.digest(), state(2, 50, 50).digest());
        assert_ne!(base.digest(), state(1, 60, 40).digest());
        assert_ne!(base.digest(), base.clone().finalized().digest());
    }

    #[test]
    fn signatures_verify_against_keys() {
        let ka = keypair_from_seed(&[1; 32]);
        let kb = keypair_from_seed(&[2; 32]);
        let signed = SignedState::new(state(1, 50, 50))
            .sign(AccountId::new("a"), &ka.private)
            .sign(AccountId::new("b"), &kb.private);
        let keys = |acc: &AccountId| -> Result<PublicKey, ChannelError> {
            Ok(if acc.as_str() == "a" { ka.public } else { kb.public })
        };
        assert_eq!(signed.verify_attached(keys, &Ed25519Verifier), Ok(()));

        let swapped = |acc: &AccountId| -> Result<PublicKey, ChannelError> {
            Ok(if acc.as_str() == "a" { kb.public } else { ka.public })
        };
        assert!(matches!(
            signed.verify_attached(swapped, &Ed25519Verifier),
            Err(ChannelError::InvalidSignature(_))
        ));
    }

    #[test]
    fn missing_signature_is_reported() {
        let ka = keypair_from_seed(&[1; 32]);
        let signed = SignedState::new(state(1, 50, 50)).sign(AccountId::new("a"), &ka.private);
        let participants = [AccountId::new("a"), AccountId::new("b")];
        assert_eq!(
            signed.signed_by_all(participants.iter()),
            Err(ChannelError::MissingSignature(AccountId::new("b")))
        );
    }
}
