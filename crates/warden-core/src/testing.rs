//! In-memory trait implementations shared by the core test modules.

use std::path::Path;
use std::sync::Mutex;
use std::thread::{self, ThreadId};

use warden_contracts::{
    outcome, AuditEntry, EntryStatus, ExecutionMode, FailureCategory, LedgerRecord, WardenError,
    WardenResult,
};

use crate::traits::{AdmissionPolicy, AuditLedger};

/// Vec-backed ledger with placeholder hashes.
#[derive(Default)]
pub struct MockLedger {
    records: Mutex<Vec<LedgerRecord>>,
    append_threads: Mutex<Vec<ThreadId>>,
    fail_appends: bool,
}

impl MockLedger {
    pub fn failing() -> Self {
        Self {
            records: Mutex::new(Vec::new()),
            append_threads: Mutex::new(Vec::new()),
            fail_appends: true,
        }
    }

    pub fn records(&self) -> Vec<LedgerRecord> {
        self.records.lock().unwrap().clone()
    }

    /// Thread of every append attempt, in call order.
    pub fn append_threads(&self) -> Vec<ThreadId> {
        self.append_threads.lock().unwrap().clone()
    }
}

impl AuditLedger for MockLedger {
    fn append(&self, entry: AuditEntry) -> WardenResult<LedgerRecord> {
        self.append_threads.lock().unwrap().push(thread::current().id());
        if self.fail_appends {
            return Err(WardenError::AuditWriteFailed {
                reason: "mock ledger refuses writes".to_string(),
            });
        }
        let mut records = self.records.lock().unwrap();
        let previous_entry_hash = records
            .last()
            .map(|r| r.entry_hash.clone())
            .unwrap_or_else(|| LedgerRecord::GENESIS.to_string());
        let record = LedgerRecord {
            entry,
            previous_entry_hash,
            entry_hash: format!("hash-{}", records.len()),
        };
        records.push(record.clone());
        Ok(record)
    }

    fn verify_chain(&self) -> WardenResult<usize> {
        Ok(self.records.lock().unwrap().len())
    }

    fn latest(&self) -> WardenResult<Option<LedgerRecord>> {
        Ok(self.records.lock().unwrap().last().cloned())
    }

    fn all_for_execution(&self, execution_id: &str) -> WardenResult<Vec<LedgerRecord>> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.execution_id() == execution_id)
            .cloned()
            .collect())
    }

    fn recover_orphans(&self, mode: ExecutionMode) -> WardenResult<Vec<LedgerRecord>> {
        let mut last: Vec<LedgerRecord> = Vec::new();
        for record in self.records() {
            match last.iter_mut().find(|r| r.execution_id() == record.execution_id()) {
                Some(slot) => *slot = record,
                None => last.push(record),
            }
        }

        let mut recovered = Vec::new();
        for record in last.into_iter().filter(|r| !r.is_terminal()) {
            let entry = AuditEntry::new(
                record.execution_id(),
                EntryStatus::Recovery,
                mode,
                record.entry.file.as_str(),
                record.entry.file_hash_before.as_str(),
            )
            .with_outcome(outcome::INTERRUPTED)
            .with_failure(FailureCategory::SystemRecovery)
            .with_errors(["Server restarted before completion"]);
            recovered.push(self.append(entry)?);
        }
        Ok(recovered)
    }
}

/// Admits `.pdf` names, files under the root, and sizes up to `max_size`.
pub struct MockPolicy {
    pub max_size: u64,
}

impl AdmissionPolicy for MockPolicy {
    fn admit_filename(&self, filename: &str) -> WardenResult<()> {
        // Path-shaped names pass so location checks can be exercised.
        if filename.ends_with(".pdf") {
            Ok(())
        } else {
            Err(WardenError::InvalidResource {
                reason: format!("'{filename}' is not a .pdf"),
            })
        }
    }

    fn admit_location(&self, source_root: &Path, candidate: &Path) -> WardenResult<()> {
        if candidate.starts_with(source_root) {
            Ok(())
        } else {
            Err(WardenError::FileNotFound {
                resource: candidate.display().to_string(),
            })
        }
    }

    fn admit_size(&self, size_bytes: u64) -> WardenResult<()> {
        if size_bytes <= self.max_size {
            Ok(())
        } else {
            Err(WardenError::InvalidResource {
                reason: format!("{size_bytes} bytes exceeds {} byte ceiling", self.max_size),
            })
        }
    }
}
