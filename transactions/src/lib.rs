//! The Strata value-transfer transaction.
//!
//! A transaction moves `amount` from one account to another and pays a `fee`
//! that is held by the ledger until distributed. Its id is the
//! domain-separated hash of `(from, to, amount, fee, timestamp)`, so the same
//! signed payload always has the same id and replays are caught by the
//! ledger's duplicate cache.

pub mod error;
pub mod transaction;
pub mod validation;

pub use error::ValidationError;
pub use transaction::{compute_id, Transaction};
pub use validation::{check_freshness, validate_stateless, verify_transaction_signature};
