//! Audit sinks owned by the node.
//!
//! [`JsonlAuditSink`] appends one JSON object per line to a file, for
//! external collaborators to tail. [`TracingAuditSink`] only logs, and is
//! used when no audit file is configured.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use strata_store::{AuditRecord, AuditSink, StoreError};
use tracing::info;

pub struct JsonlAuditSink {
    path: PathBuf,
    writer: Mutex<BufWriter<File>>,
}

impl JsonlAuditSink {
    /// Open `path` for appending, creating it and its parent directory.
    pub fn open(path: &Path) -> Result<Self, std::io::Error> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            writer: Mutex::new(BufWriter::new(file)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AuditSink for JsonlAuditSink {
    fn append(&self, record: &AuditRecord) -> Result<(), StoreError> {
        let line =
            serde_json::to_string(record).map_err(|e| StoreError::Serialization(e.to_string()))?;
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        writeln!(writer, "{line}")
            .and_then(|()| writer.flush())
            .map_err(|e| StoreError::Backend(format!("{}: {e}", self.path.display())))
    }
}

#[derive(Debug, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn append(&self, record: &AuditRecord) -> Result<(), StoreError> {
        info!(
            target: "strata::audit",
            kind = ?record.kind,
            subject = %record.subject,
            detail = %record.detail,
            timestamp = %record.timestamp,
            "audit"
        );
        Ok(())
    }
}
