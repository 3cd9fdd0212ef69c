//! Audit entry and ledger record types.
//!
//! `AuditEntry` is what the governor produces at each state transition.
//! `LedgerRecord` is what the ledger stores: the entry plus the two hashes
//! that link it into the chain.  Records are never modified once written.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::execution::ExecutionMode;

/// Free-form outcome classifications written by the runtime.
pub mod outcome {
    pub const NONE: &str = "NONE";
    /// Observe mode: the action was authorized but not performed.
    pub const SIMULATED: &str = "SIMULATED";
    pub const SUCCESS: &str = "SUCCESS";
    pub const FAILURE: &str = "FAILURE";
    pub const TIMEOUT: &str = "TIMEOUT";
    /// The process stopped before the execution reached a terminal state.
    pub const INTERRUPTED: &str = "INTERRUPTED";
}

/// Lifecycle status of an execution at the time an entry was written.
///
/// `Started` and `Executing` are in-flight; every other status is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntryStatus {
    Started,
    Executing,
    CompletedSuccess,
    CompletedFailure,
    Timeout,
    Recovery,
}

impl EntryStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, EntryStatus::Started | EntryStatus::Executing)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EntryStatus::Started => "STARTED",
            EntryStatus::Executing => "EXECUTING",
            EntryStatus::CompletedSuccess => "COMPLETED_SUCCESS",
            EntryStatus::CompletedFailure => "COMPLETED_FAILURE",
            EntryStatus::Timeout => "TIMEOUT",
            EntryStatus::Recovery => "RECOVERY",
        }
    }
}

/// Why an execution failed, when it did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureCategory {
    #[default]
    None,
    /// The extractor exited non-zero or could not be launched.
    RuntimeError,
    /// The extractor exceeded its wall-clock budget and was killed.
    Timeout,
    /// A lifecycle move failed.
    FileSystemError,
    /// Closed out by startup recovery after an unclean shutdown.
    SystemRecovery,
}

/// One audit record, before it is linked into the chain.
///
/// Field order matches the canonical serialization order.  Every field has
/// a type-appropriate default so that entries read back from the ledger
/// never depend on a key being present, except `status`: an entry without a
/// recognisable status is malformed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    #[serde(default)]
    pub execution_id: String,

    pub status: EntryStatus,

    #[serde(default)]
    pub mode: ExecutionMode,

    /// ISO-8601 UTC timestamp with millisecond precision.
    #[serde(default)]
    pub timestamp: String,

    /// Absolute path of the target file at admission time.
    #[serde(default)]
    pub file: String,

    /// Hex SHA-256 of the file content, computed once per execution.
    #[serde(default)]
    pub file_hash_before: String,

    #[serde(default = "default_outcome")]
    pub outcome: String,

    #[serde(default)]
    pub pid: u32,

    #[serde(default = "default_exit_code")]
    pub exit_code: i32,

    #[serde(default)]
    pub failure_category: FailureCategory,

    #[serde(default)]
    pub stdout_snippet: String,

    #[serde(default)]
    pub stderr_snippet: String,

    #[serde(default)]
    pub runtime_ms: u64,

    #[serde(default)]
    pub errors: Vec<String>,
}

fn default_outcome() -> String {
    outcome::NONE.to_string()
}

fn default_exit_code() -> i32 {
    -1
}

/// Current wall-clock time as an ISO-8601 string, e.g. `2026-10-18T09:15:02.118Z`.
pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

impl AuditEntry {
    /// Create an entry stamped with the current time and all optional
    /// fields at their defaults.
    pub fn new(
        execution_id: impl Into<String>,
        status: EntryStatus,
        mode: ExecutionMode,
        file: impl Into<String>,
        file_hash_before: impl Into<String>,
    ) -> Self {
        Self {
            execution_id: execution_id.into(),
            status,
            mode,
            timestamp: now_timestamp(),
            file: file.into(),
            file_hash_before: file_hash_before.into(),
            outcome: default_outcome(),
            pid: 0,
            exit_code: default_exit_code(),
            failure_category: FailureCategory::None,
            stdout_snippet: String::new(),
            stderr_snippet: String::new(),
            runtime_ms: 0,
            errors: Vec::new(),
        }
    }

    pub fn with_outcome(mut self, outcome: impl Into<String>) -> Self {
        self.outcome = outcome.into();
        self
    }

    pub fn with_pid(mut self, pid: u32) -> Self {
        self.pid = pid;
        self
    }

    pub fn with_exit_code(mut self, exit_code: i32) -> Self {
        self.exit_code = exit_code;
        self
    }

    pub fn with_failure(mut self, category: FailureCategory) -> Self {
        self.failure_category = category;
        self
    }

    /// Attach captured output.  The ledger truncates each stream when the
    /// entry is canonicalized.
    pub fn with_output(mut self, stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        self.stdout_snippet = stdout.into();
        self.stderr_snippet = stderr.into();
        self
    }

    pub fn with_runtime_ms(mut self, runtime_ms: u64) -> Self {
        self.runtime_ms = runtime_ms;
        self
    }

    pub fn with_errors<I, S>(mut self, errors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.errors = errors.into_iter().map(Into::into).collect();
        self
    }
}

/// An `AuditEntry` as persisted: linked to its predecessor and sealed with
/// its own hash.
///
/// `entry_hash` is the SHA-256 of the canonical serialization of every
/// other field, `previous_entry_hash` included.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerRecord {
    #[serde(flatten)]
    pub entry: AuditEntry,

    /// `entry_hash` of the preceding record, or `GENESIS` for the first.
    pub previous_entry_hash: String,

    pub entry_hash: String,
}

impl LedgerRecord {
    /// The `previous_entry_hash` of the first record in a ledger.
    pub const GENESIS: &'static str = "GENESIS";

    pub fn execution_id(&self) -> &str {
        &self.entry.execution_id
    }

    pub fn status(&self) -> EntryStatus {
        self.entry.status
    }

    pub fn is_terminal(&self) -> bool {
        self.entry.status.is_terminal()
    }
}
