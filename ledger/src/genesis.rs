//! Genesis state: the accounts a network starts with.
//!
//! The genesis configuration differs per `NetworkId` (at least by
//! timestamp), so each network has a distinct, deterministic state root.
//! The chain's block 0 commits to that root.

use serde::{Deserialize, Serialize};
use strata_crypto::{domain, domain_hash};
use strata_types::{AccountId, Amount, BlockHash, NetworkId, PublicKey, Timestamp};

use crate::error::LedgerError;
use crate::state::{ChainMeta, LedgerConfig, LedgerState};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenesisAccount {
    pub id: AccountId,
    pub public_key: PublicKey,
    pub balance: Amount,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenesisConfig {
    pub network: NetworkId,
    #[serde(default)]
    pub timestamp: Option<Timestamp>,
    #[serde(default)]
    pub accounts: Vec<GenesisAccount>,
}

impl GenesisConfig {
    pub fn new(network: NetworkId) -> Self {
        Self {
            network,
            timestamp: None,
            accounts: Vec::new(),
        }
    }

    pub fn with_account(mut self, id: AccountId, public_key: PublicKey, balance: Amount) -> Self {
        self.accounts.push(GenesisAccount {
            id,
            public_key,
            balance,
        });
        self
    }

    /// The configured timestamp, or the network's default.
    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
            .unwrap_or_else(|| genesis_timestamp(self.network))
    }

    /// Deterministic commitment to the genesis accounts.
    pub fn state_root(&self) -> [u8; 32] {
        let ts = self.timestamp().as_secs().to_le_bytes();
        let mut fields: Vec<Vec<u8>> = vec![self.network.as_str().as_bytes().to_vec(), ts.to_vec()];
        for account in &self.accounts {
            fields.push(account.id.as_str().as_bytes().to_vec());
            fields.push(account.public_key.as_bytes().to_vec());
            fields.push(account.balance.raw().to_le_bytes().to_vec());
        }
        let refs: Vec<&[u8]> = fields.iter().map(Vec::as_slice).collect();
        domain_hash(domain::GENESIS, &refs)
    }
}

/// Genesis timestamp per network.
pub fn genesis_timestamp(network: NetworkId) -> Timestamp {
    match network {
        // 2026-01-01 00:00:00 UTC
        NetworkId::Live => Timestamp::new(1_767_225_600),
        // 2025-06-01 00:00:00 UTC
        NetworkId::Test => Timestamp::new(1_748_736_000),
        NetworkId::Dev => Timestamp::new(0),
    }
}

impl LedgerState {
    /// Seed accounts from a genesis configuration. `genesis_block_hash` is
    /// the hash of block 0 built over the same configuration.
    pub fn from_genesis(
        genesis: &GenesisConfig,
        config: LedgerConfig,
        genesis_block_hash: BlockHash,
    ) -> Result<Self, LedgerError> {
        let mut state = LedgerState::new(config);
        for account in &genesis.accounts {
            state.open_account(account.id.clone(), account.public_key, account.balance)?;
        }
        state.chain = ChainMeta {
            block_height: 0,
            last_block_hash: genesis_block_hash,
        };
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::tests::key;

    #[test]
    fn state_root_is_deterministic() {
        let a = GenesisConfig::new(NetworkId::Dev);
        assert_eq!(a.state_root(), GenesisConfig::new(NetworkId::Dev).state_root());
    }

    #[test]
    fn state_roots_differ_per_network() {
        let live = GenesisConfig::new(NetworkId::Live).state_root();
        let test = GenesisConfig::new(NetworkId::Test).state_root();
        let dev = GenesisConfig::new(NetworkId::Dev).state_root();
        assert_ne!(live, test);
        assert_ne!(live, dev);
        assert_ne!(test, dev);
    }

    #[test]
    fn accounts_change_state_root() {
        let empty = GenesisConfig::new(NetworkId::Dev);
        let funded = empty
            .clone()
            .with_account(AccountId::new("alice"), key(1).public, Amount::new(100));
        assert_ne!(empty.state_root(), funded.state_root());
    }

    #[test]
    fn from_genesis_seeds_accounts() {
        let genesis = GenesisConfig::new(NetworkId::Dev)
            .with_account(AccountId::new("alice"), key(1).public, Amount::new(100))
            .with_account(AccountId::new("bob"), key(2).public, Amount::new(5));
        let tip = BlockHash::new([8; 32]);
        let state = LedgerState::from_genesis(&genesis, LedgerConfig::default(), tip).unwrap();
        assert_eq!(state.account_count(), 2);
        assert_eq!(state.get_balance(&AccountId::new("alice")).unwrap(), Amount::new(100));
        assert_eq!(state.block_height(), 0);
        assert_eq!(state.last_block_hash(), tip);
    }

    #[test]
    fn duplicate_genesis_account_rejected() {
        let genesis = GenesisConfig::new(NetworkId::Dev)
            .with_account(AccountId::new("alice"), key(1).public, Amount::new(1))
            .with_account(AccountId::new("alice"), key(1).public, Amount::new(1));
        assert!(matches!(
            LedgerState::from_genesis(&genesis, LedgerConfig::default(), BlockHash::ZERO),
            Err(LedgerError::AccountExists(_))
        ));
    }

    #[test]
    fn explicit_timestamp_overrides_network_default() {
        let mut g = GenesisConfig::new(NetworkId::Live);
        assert_eq!(g.timestamp(), genesis_timestamp(NetworkId::Live));
        g.timestamp = Some(Timestamp::new(5));
        assert_eq!(g.timestamp(), Timestamp::new(5));
    }
}
