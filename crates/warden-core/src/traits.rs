//! Core trait definitions for the Warden execution pipeline.
//!
//! These two traits define the trust boundary around the governor:
//!
//! - `AuditLedger`: trusted sink (records every transition immutably)
//! - `AdmissionPolicy`: trusted gate (decides which files may be acted on)
//!
//! The governor wires them together in the correct order.  No file is ever
//! moved unless the policy admitted it AND the ledger accepted a `STARTED`
//! entry for it.

use std::path::Path;

use warden_contracts::{AuditEntry, ExecutionMode, LedgerRecord, WardenResult};

/// The audit ledger: the append-only, hash-chained execution record.
///
/// Every state transition of every execution produces exactly one entry.
/// A failed append is fatal for the request that attempted it.
pub trait AuditLedger: Send + Sync {
    /// Link `entry` to the current chain tail and durably persist it.
    ///
    /// This is the only mutation path.  Implementations must serialize
    /// appends against each other: each one depends on the hash of the one
    /// before it.
    fn append(&self, entry: AuditEntry) -> WardenResult<LedgerRecord>;

    /// Replay the whole ledger and recompute every hash.
    ///
    /// Returns the number of verified entries, or
    /// `WardenError::IntegrityViolation` naming the first offending line.
    /// A partially written line is a violation, not something to skip.
    fn verify_chain(&self) -> WardenResult<usize>;

    /// The most recent well-formed record, if any.
    fn latest(&self) -> WardenResult<Option<LedgerRecord>>;

    /// Every well-formed record for one execution, in ledger order.
    ///
    /// Best-effort: malformed lines are skipped rather than failing the scan.
    fn all_for_execution(&self, execution_id: &str) -> WardenResult<Vec<LedgerRecord>>;

    /// The most recent record for one execution.
    fn latest_for_execution(&self, execution_id: &str) -> WardenResult<Option<LedgerRecord>> {
        Ok(self.all_for_execution(execution_id)?.pop())
    }

    /// Close out every execution whose last known status is in-flight by
    /// appending a synthetic `RECOVERY` entry.  Returns the appended records.
    fn recover_orphans(&self, mode: ExecutionMode) -> WardenResult<Vec<LedgerRecord>>;
}

/// The admission policy: static rules about which files may be acted on.
///
/// Implementations are **trusted** and must be deterministic.  They perform
/// no I/O; the governor resolves paths and reads metadata, then asks the
/// policy to judge the result.
pub trait AdmissionPolicy: Send + Sync {
    /// Check a bare file name against the allow-pattern.
    fn admit_filename(&self, filename: &str) -> WardenResult<()>;

    /// Check that `candidate` (canonical) stays inside `source_root` (canonical).
    fn admit_location(&self, source_root: &Path, candidate: &Path) -> WardenResult<()>;

    /// Check a file size against the ceiling.
    fn admit_size(&self, size_bytes: u64) -> WardenResult<()>;

    /// Whether a file should appear in listings.
    fn is_listable(&self, filename: &str) -> bool {
        self.admit_filename(filename).is_ok()
    }
}
