//! Execution identity and mode types.
//!
//! An execution is one governed run of an action against one file.  It is
//! never persisted on its own; it is reconstructed by scanning the ledger
//! for entries sharing an `ExecutionId`.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Unique identifier for a single governed execution.
///
/// Appears in every ledger entry the execution produces and is what callers
/// poll through the audit lookup interface.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExecutionId(pub uuid::Uuid);

impl ExecutionId {
    /// Create a new, unique execution ID.
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for ExecutionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ExecutionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Whether governance decisions are only recorded or also enforced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// Decisions are recorded; no file moves, no subprocess.
    #[default]
    Observe,
    /// Files are moved through the lifecycle directories and the extractor runs.
    Live,
}

impl ExecutionMode {
    /// Interpret a configuration value.
    ///
    /// Only `live` (any case, surrounding whitespace ignored) selects live
    /// mode.  Every other value, including typos, falls back to observe so a
    /// misconfiguration can never enable side effects.
    pub fn from_config_value(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("live") {
            ExecutionMode::Live
        } else {
            ExecutionMode::Observe
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionMode::Observe => "observe",
            ExecutionMode::Live => "live",
        }
    }
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An inbound request to run the governed action on one file.
///
/// `confirm` is the caller's explicit consent; the governor never infers it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionRequest {
    /// Caller identity used for rate limiting (usually the peer address).
    pub caller: String,
    /// Bare file name inside the source directory.
    pub filename: Option<String>,
    /// Must be `true` for the request to be admitted.
    pub confirm: bool,
}
