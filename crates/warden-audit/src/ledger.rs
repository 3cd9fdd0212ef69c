//! File-backed implementation of `AuditLedger`.
//!
//! `FileLedger` persists the chain as newline-delimited canonical JSON, one
//! sealed entry per line.  Appends are serialized by an in-process mutex and
//! each one is flushed to stable storage before it is reported as written.
//!
//! Reads come in two strengths:
//!   - `verify_chain` is strict: any malformed line, a half-written tail
//!     included, is an integrity violation at that physical line number.
//!   - the query methods are lenient: malformed lines are skipped so that
//!     diagnosis still works on a damaged ledger.

use std::collections::{HashMap, HashSet};
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use warden_contracts::{
    outcome, AuditEntry, EntryStatus, ExecutionMode, FailureCategory, LedgerRecord, WardenError,
    WardenResult,
};
use warden_core::traits::AuditLedger;

use crate::chain::{seal, verify_lines};

/// Error recorded on every entry appended by orphan recovery.
pub const RECOVERY_REASON: &str = "Server restarted before completion";

/// An append-only, hash-chained ledger stored in a single file.
#[derive(Debug)]
pub struct FileLedger {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileLedger {
    /// Open the ledger at `path`, creating its parent directory.  The file
    /// itself is created by the first append.
    pub fn open(path: impl Into<PathBuf>) -> WardenResult<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| WardenError::ConfigError {
                reason: format!("cannot create ledger directory '{}': {}", parent.display(), e),
            })?;
        }
        Ok(Self {
            path,
            write_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Raw ledger text.  An absent ledger is empty.  Invalid UTF-8 is
    /// replaced rather than rejected so verification can point at the line.
    fn read_text(&self) -> WardenResult<String> {
        match fs::read(&self.path) {
            Ok(bytes) => Ok(String::from_utf8_lossy(&bytes).into_owned()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(String::new()),
            Err(e) => Err(WardenError::AuditWriteFailed {
                reason: format!("cannot read ledger '{}': {}", self.path.display(), e),
            }),
        }
    }

    /// Every well-formed record in ledger order.
    fn records(&self) -> WardenResult<Vec<LedgerRecord>> {
        let text = self.read_text()?;
        let mut records = Vec::new();
        for (i, line) in text.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<LedgerRecord>(line) {
                Ok(record) => records.push(record),
                Err(e) => debug!(line = i + 1, error = %e, "skipping malformed ledger line"),
            }
        }
        Ok(records)
    }

    /// `entry_hash` of the last non-blank line, or `GENESIS`.
    ///
    /// An unreadable tail means the chain cannot be extended safely.
    fn tail_hash(&self) -> WardenResult<String> {
        let text = self.read_text()?;
        let tail = text
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .last();

        let Some((i, line)) = tail else {
            return Ok(LedgerRecord::GENESIS.to_string());
        };

        serde_json::from_str::<Map<String, Value>>(line)
            .ok()
            .and_then(|fields| fields.get("entry_hash").and_then(Value::as_str).map(str::to_string))
            .ok_or_else(|| WardenError::IntegrityViolation {
                line: i + 1,
                reason: "last entry is unreadable; refusing to extend the chain".to_string(),
            })
    }

    fn write_line(&self, line: &str) -> io::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let mut buf = String::with_capacity(line.len() + 1);
        buf.push_str(line);
        buf.push('\n');
        file.write_all(buf.as_bytes())?;
        file.sync_data()
    }
}

impl AuditLedger for FileLedger {
    fn append(&self, entry: AuditEntry) -> WardenResult<LedgerRecord> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);

        let fields = match serde_json::to_value(&entry) {
            Ok(Value::Object(fields)) => fields,
            Ok(_) | Err(_) => {
                return Err(WardenError::AuditWriteFailed {
                    reason: "entry does not serialize to an object".to_string(),
                })
            }
        };

        let previous = self.tail_hash()?;
        let sealed = seal(&previous, &fields);

        // Read back through the codec so the caller sees exactly what was
        // stored (truncated snippets, coerced defaults).
        let record: LedgerRecord =
            serde_json::from_str(&sealed.line).map_err(|e| WardenError::AuditWriteFailed {
                reason: format!("sealed entry does not round-trip: {}", e),
            })?;

        self.write_line(&sealed.line)
            .map_err(|e| WardenError::AuditWriteFailed {
                reason: format!("cannot append to ledger '{}': {}", self.path.display(), e),
            })?;

        debug!(
            execution_id = %record.execution_id(),
            status = record.status().as_str(),
            entry_hash = %record.entry_hash,
            "ledger entry appended"
        );
        Ok(record)
    }

    fn verify_chain(&self) -> WardenResult<usize> {
        let text = self.read_text()?;
        let verified = verify_lines(text.lines().enumerate().map(|(i, line)| (i + 1, line)))
            .map_err(|e| {
                warn!(ledger = %self.path.display(), error = %e, "ledger chain verification failed");
                e
            })?;
        debug!(ledger = %self.path.display(), entries = verified, "ledger chain verified");
        Ok(verified)
    }

    fn latest(&self) -> WardenResult<Option<LedgerRecord>> {
        Ok(self.records()?.pop())
    }

    fn all_for_execution(&self, execution_id: &str) -> WardenResult<Vec<LedgerRecord>> {
        Ok(self
            .records()?
            .into_iter()
            .filter(|record| record.execution_id() == execution_id)
            .collect())
    }

    fn recover_orphans(&self, mode: ExecutionMode) -> WardenResult<Vec<LedgerRecord>> {
        // Last in-flight record per execution, in order of first appearance.
        let mut order: Vec<String> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        let mut in_flight: HashMap<String, LedgerRecord> = HashMap::new();

        for record in self.records()? {
            let id = record.execution_id().to_string();
            if record.is_terminal() {
                in_flight.remove(&id);
            } else {
                if seen.insert(id.clone()) {
                    order.push(id.clone());
                }
                in_flight.insert(id, record);
            }
        }

        let mut recovered = Vec::new();
        for id in order {
            let Some(last) = in_flight.remove(&id) else {
                continue;
            };
            let entry = AuditEntry::new(
                &id,
                EntryStatus::Recovery,
                mode,
                last.entry.file.as_str(),
                last.entry.file_hash_before.as_str(),
            )
            .with_outcome(outcome::INTERRUPTED)
            .with_failure(FailureCategory::SystemRecovery)
            .with_errors([RECOVERY_REASON]);

            let record = self.append(entry)?;
            info!(
                execution_id = %id,
                last_status = last.status().as_str(),
                "recovered orphaned execution"
            );
            recovered.push(record);
        }

        Ok(recovered)
    }
}
