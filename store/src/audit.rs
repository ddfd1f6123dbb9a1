//! Append-only audit trail.
//!
//! Conflicts, rejections, rewards, punishments and settlement outcomes are
//! written here for external collaborators (compliance, dashboards). The
//! core never reads the trail back, and a failing sink never fails the
//! operation that produced the record.

use serde::{Deserialize, Serialize};
use strata_types::Timestamp;

use crate::StoreError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditKind {
    TransactionRejected,
    DuplicateTransaction,
    SubBlockRejected,
    BlockFinalized,
    BlockRejected,
    ConsistencyFault,
    Reward,
    Punishment,
    EscrowSettled,
    ExitFinalized,
    ExitChallenged,
    ChannelSettled,
    RootSubmissionFailed,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub timestamp: Timestamp,
    pub kind: AuditKind,
    /// The id of the thing the record is about (tx, sub-block, block, channel...).
    pub subject: String,
    pub detail: String,
}

impl AuditRecord {
    pub fn new(
        timestamp: Timestamp,
        kind: AuditKind,
        subject: impl Into<String>,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            timestamp,
            kind,
            subject: subject.into(),
            detail: detail.into(),
        }
    }
}

pub trait AuditSink: Send + Sync {
    fn append(&self, record: &AuditRecord) -> Result<(), StoreError>;
}
