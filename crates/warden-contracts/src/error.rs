//! Runtime error types for the Warden governed execution pipeline.
//!
//! All fallible operations return `WardenResult<T>`.  Every variant maps to
//! a stable wire `ErrorCode` so callers can branch on it without parsing
//! messages.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::entry::LedgerRecord;

/// Stable, machine-readable error codes exposed to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    RateLimited,
    GovernanceBlocked,
    InvalidResource,
    FileNotFound,
    ResourceLocked,
    CooldownActive,
    InternalFailure,
    IntegrityViolation,
    NotFound,
    ConfigError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::RateLimited => "RATE_LIMITED",
            ErrorCode::GovernanceBlocked => "GOVERNANCE_BLOCKED",
            ErrorCode::InvalidResource => "INVALID_RESOURCE",
            ErrorCode::FileNotFound => "FILE_NOT_FOUND",
            ErrorCode::ResourceLocked => "RESOURCE_LOCKED",
            ErrorCode::CooldownActive => "COOLDOWN_ACTIVE",
            ErrorCode::InternalFailure => "INTERNAL_FAILURE",
            ErrorCode::IntegrityViolation => "INTEGRITY_VIOLATION",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::ConfigError => "CONFIG_ERROR",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The unified error type for the Warden runtime.
#[derive(Debug, Error)]
pub enum WardenError {
    /// The caller exceeded its per-minute request ceiling.
    #[error("rate limit exceeded for caller '{caller}'")]
    RateLimited { caller: String },

    /// The request lacked explicit confirmation.
    #[error("governance blocked: {reason}")]
    GovernanceBlocked { reason: String },

    /// The file name or size is not admissible.
    #[error("invalid resource: {reason}")]
    InvalidResource { reason: String },

    /// The file does not exist or resolves outside its source directory.
    #[error("file not found: {resource}")]
    FileNotFound { resource: String },

    /// Another execution currently holds the lock for this file.
    #[error("resource '{resource}' is locked by execution {holder}")]
    ResourceLocked { resource: String, holder: String },

    /// The file was acted on too recently.
    #[error("cooldown active for '{resource}' ({remaining_ms}ms remaining)")]
    CooldownActive { resource: String, remaining_ms: u64 },

    /// An unexpected local failure before any ledger write (e.g. hashing).
    #[error("internal failure: {reason}")]
    InternalFailure { reason: String },

    /// The stored chain does not verify.
    ///
    /// `line` is the 1-based line of the ledger where verification failed.
    #[error("integrity violation at line {line}: {reason}")]
    IntegrityViolation { line: usize, reason: String },

    /// The ledger could not persist an entry.
    ///
    /// Fatal for the request: an action that cannot be audited does not run.
    #[error("audit write failed: {reason}")]
    AuditWriteFailed { reason: String },

    /// An admitted execution ended early; the ledger holds its terminal entry.
    #[error("execution {execution_id} aborted: {reason}")]
    ExecutionAborted {
        execution_id: String,
        reason: String,
        last_entry: Option<Box<LedgerRecord>>,
    },

    /// No ledger entry exists for the requested execution.
    #[error("execution not found: {execution_id}")]
    ExecutionNotFound { execution_id: String },

    /// A required configuration value is missing or invalid.
    #[error("configuration error: {reason}")]
    ConfigError { reason: String },
}

impl WardenError {
    /// The wire code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            WardenError::RateLimited { .. } => ErrorCode::RateLimited,
            WardenError::GovernanceBlocked { .. } => ErrorCode::GovernanceBlocked,
            WardenError::InvalidResource { .. } => ErrorCode::InvalidResource,
            WardenError::FileNotFound { .. } => ErrorCode::FileNotFound,
            WardenError::ResourceLocked { .. } => ErrorCode::ResourceLocked,
            WardenError::CooldownActive { .. } => ErrorCode::CooldownActive,
            WardenError::InternalFailure { .. } | WardenError::ExecutionAborted { .. } => {
                ErrorCode::InternalFailure
            }
            WardenError::IntegrityViolation { .. } | WardenError::AuditWriteFailed { .. } => {
                ErrorCode::IntegrityViolation
            }
            WardenError::ExecutionNotFound { .. } => ErrorCode::NotFound,
            WardenError::ConfigError { .. } => ErrorCode::ConfigError,
        }
    }

    /// True for rejections raised by an admission gate.  These never write
    /// to the ledger and never hold a lock; the caller may retry later.
    pub fn is_admission_rejection(&self) -> bool {
        matches!(
            self,
            WardenError::RateLimited { .. }
                | WardenError::GovernanceBlocked { .. }
                | WardenError::InvalidResource { .. }
                | WardenError::FileNotFound { .. }
                | WardenError::ResourceLocked { .. }
                | WardenError::CooldownActive { .. }
        )
    }
}

/// Convenience alias used throughout the Warden crates.
pub type WardenResult<T> = Result<T, WardenError>;
