//! Nullable audit sink — keeps records in memory.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use strata_store::{AuditKind, AuditRecord, AuditSink, StoreError};

/// Records every appended audit record. Can be switched to fail, to check
/// that sink failures never fail the operation being audited.
#[derive(Debug, Default)]
pub struct NullAuditSink {
    records: Mutex<Vec<AuditRecord>>,
    failing: AtomicBool,
}

impl NullAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn records(&self) -> Vec<AuditRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn count(&self, kind: AuditKind) -> usize {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|r| r.kind == kind)
            .count()
    }
}

impl AuditSink for NullAuditSink {
    fn append(&self, record: &AuditRecord) -> Result<(), StoreError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("audit sink offline".into()));
        }
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_types::Timestamp;

    #[test]
    fn records_until_failing() {
        let sink = NullAuditSink::new();
        let record = AuditRecord::new(Timestamp::EPOCH, AuditKind::Reward, "alice", "test");
        sink.append(&record).unwrap();
        sink.set_failing(true);
        assert!(sink.append(&record).is_err());
        assert_eq!(sink.records(), vec![record]);
        assert_eq!(sink.count(AuditKind::Reward), 1);
    }
}
