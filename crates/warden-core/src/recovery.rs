//! Startup recovery.
//!
//! Runs once, before the service accepts requests, and repairs whatever an
//! unclean shutdown left behind:
//!
//! 1. Verify the ledger chain.  A broken chain aborts startup; tampering is
//!    not something to heal silently.
//! 2. Quarantine staged orphans.  A `.tmp` file in staging means the process
//!    died between the two renames of admission.  Each one gets a `RECOVERY`
//!    entry and is moved to the error directory.
//! 3. Close out in-flight executions through `AuditLedger::recover_orphans`.
//! 4. Move any working-directory copy of a recovered execution's file to the
//!    error directory, so no file is left in a transient location.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use warden_contracts::{
    outcome, AuditEntry, EntryStatus, ExecutionMode, FailureCategory, WardenError, WardenResult,
};

use crate::layout::{execution_id_from_staging, DirectoryLayout};
use crate::traits::AuditLedger;

/// Errors recorded for a file found mid-transfer in staging.
pub const ORPHAN_STAGING_ERRORS: [&str; 2] = ["ORPHAN_STAGING_TMP", "HASH_UNKNOWN"];

/// What startup recovery found and repaired.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Entries in the ledger when the chain was verified.
    pub verified_entries: usize,
    /// Staged orphans moved to the error directory (new locations).
    pub quarantined: Vec<PathBuf>,
    /// Executions closed out with a synthetic `RECOVERY` entry.
    pub recovered_executions: Vec<String>,
}

impl RecoveryReport {
    pub fn is_clean(&self) -> bool {
        self.quarantined.is_empty() && self.recovered_executions.is_empty()
    }
}

/// Bring the ledger and the lifecycle directories back into agreement.
///
/// # Errors
///
/// - `IntegrityViolation` if the chain does not verify (nothing is written)
/// - `InternalFailure` if a staged orphan cannot be listed or moved
/// - any ledger error raised while appending recovery entries
pub fn run_startup_recovery(
    ledger: &dyn AuditLedger,
    layout: &DirectoryLayout,
    mode: ExecutionMode,
) -> WardenResult<RecoveryReport> {
    let verified_entries = ledger.verify_chain()?;
    info!(entries = verified_entries, "ledger chain verified");

    let mut report = RecoveryReport {
        verified_entries,
        ..RecoveryReport::default()
    };

    let orphans = layout
        .staged_orphans()
        .map_err(|e| WardenError::InternalFailure {
            reason: format!("cannot scan staging directory: {e}"),
        })?;
    for orphan in orphans {
        report.quarantined.push(quarantine_staged(ledger, layout, mode, &orphan)?);
    }

    for record in ledger.recover_orphans(mode)? {
        let execution_id = record.execution_id().to_string();
        warn!(
            execution_id = %execution_id,
            file = %record.entry.file,
            "in-flight execution closed by recovery"
        );

        if let Some(name) = Path::new(&record.entry.file).file_name().and_then(|n| n.to_str()) {
            let working = layout.working_path(&execution_id, name);
            if working.is_file() {
                let destination = layout.error_path(&execution_id, name);
                match fs::rename(&working, &destination) {
                    Ok(()) => info!(
                        execution_id = %execution_id,
                        destination = %destination.display(),
                        "working copy quarantined"
                    ),
                    Err(e) => warn!(
                        execution_id = %execution_id,
                        working = %working.display(),
                        error = %e,
                        "failed to quarantine working copy"
                    ),
                }
            }
        }

        report.recovered_executions.push(execution_id);
    }

    info!(
        quarantined = report.quarantined.len(),
        recovered = report.recovered_executions.len(),
        "startup recovery complete"
    );
    Ok(report)
}

/// Record and move one staged orphan.  The entry is written first so the
/// move is never unaudited.
fn quarantine_staged(
    ledger: &dyn AuditLedger,
    layout: &DirectoryLayout,
    mode: ExecutionMode,
    orphan: &Path,
) -> WardenResult<PathBuf> {
    let name = orphan
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let execution_id = execution_id_from_staging(orphan).unwrap_or_else(|| name.clone());
    let destination = layout.error.join(&name);

    let entry = AuditEntry::new(
        &execution_id,
        EntryStatus::Recovery,
        mode,
        destination.display().to_string(),
        "",
    )
    .with_outcome(outcome::INTERRUPTED)
    .with_failure(FailureCategory::SystemRecovery)
    .with_errors(ORPHAN_STAGING_ERRORS);
    ledger.append(entry)?;

    fs::rename(orphan, &destination).map_err(|e| WardenError::InternalFailure {
        reason: format!("cannot quarantine staged orphan {}: {e}", orphan.display()),
    })?;

    warn!(
        execution_id = %execution_id,
        destination = %destination.display(),
        "staged orphan quarantined"
    );
    Ok(destination)
}

// ── Tests ────────────────────────────────────────────────────────────────────
