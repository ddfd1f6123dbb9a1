//! Account and validator identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a ledger account.
///
/// Accounts are registered explicitly with a public key; the identifier is an
/// opaque, non-empty string chosen by the registering collaborator.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AccountId(String);

impl AccountId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this identifier is well-formed (non-empty, no whitespace).
    pub fn is_valid(&self) -> bool {
        !self.0.is_empty() && !self.0.chars().any(char::is_whitespace)
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AccountId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Identifier of a validator that assembles sub-blocks.
///
/// Validator selection and weighting are external input; the core only
/// records who produced a sub-block and tracks stake/reward bookkeeping.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ValidatorId(String);

impl ValidatorId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ValidatorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ValidatorId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn account_validity() {
        assert!(AccountId::new("alice").is_valid());
        assert!(!AccountId::new("").is_valid());
        assert!(!AccountId::new("al ice").is_valid());
    }
}
