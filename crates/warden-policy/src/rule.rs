//! Admission rule configuration schema.
//!
//! A `PolicyConfig` is deserialized from TOML.  Every field has a default,
//! so an empty document yields the standard PDF-only policy.
//!
//! Example:
//! ```toml
//! allowed_file_regex = '^[a-zA-Z0-9_\-\.]+\.pdf$'
//! max_file_size_mb = 50
//! ```

use serde::{Deserialize, Serialize};

/// Default allow-pattern: a plain file name with a `.pdf` suffix.
pub const DEFAULT_ALLOWED_FILE_REGEX: &str = r"^[a-zA-Z0-9_\-\.]+\.pdf$";

/// Default per-file size ceiling in MiB.
pub const DEFAULT_MAX_FILE_SIZE_MB: u64 = 50;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// File names must match this pattern in full to be admitted or listed.
    #[serde(default = "default_allowed_file_regex")]
    pub allowed_file_regex: String,

    /// Files strictly larger than this are rejected.
    #[serde(default = "default_max_file_size_mb")]
    pub max_file_size_mb: u64,
}

impl PolicyConfig {
    pub fn max_size_bytes(&self) -> u64 {
        self.max_file_size_mb.saturating_mul(1024 * 1024)
    }
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            allowed_file_regex: default_allowed_file_regex(),
            max_file_size_mb: default_max_file_size_mb(),
        }
    }
}

fn default_allowed_file_regex() -> String {
    DEFAULT_ALLOWED_FILE_REGEX.to_string()
}

fn default_max_file_size_mb() -> u64 {
    DEFAULT_MAX_FILE_SIZE_MB
}
