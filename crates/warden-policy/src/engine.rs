//! Rule-based admission policy implementation.
//!
//! `RulePolicy` compiles a `PolicyConfig` once and implements the
//! `AdmissionPolicy` trait from warden-core.
//!
//! Checks, in the order the governor asks for them:
//!
//! 1. Name: the bare file name must match `allowed_file_regex`
//!    → `InvalidResource`
//! 2. Location: the canonical candidate must lie under the canonical source
//!    root → `FileNotFound` (an escaping path is treated as absent)
//! 3. Size: `size_bytes` must not exceed `max_file_size_mb` → `InvalidResource`

use std::path::Path;

use regex::Regex;
use tracing::{debug, warn};

use warden_contracts::{WardenError, WardenResult};
use warden_core::traits::AdmissionPolicy;

use crate::rule::PolicyConfig;

/// An `AdmissionPolicy` backed by a compiled allow-pattern and size ceiling.
///
/// ```rust,ignore
/// use warden_policy::RulePolicy;
///
/// let policy = RulePolicy::from_file(Path::new("warden-policy.toml"))?;
/// ```
#[derive(Debug, Clone)]
pub struct RulePolicy {
    config: PolicyConfig,
    pattern: Regex,
}

impl RulePolicy {
    /// Compile `config`.
    ///
    /// Returns `WardenError::ConfigError` if the allow-pattern is not a
    /// valid regular expression.
    pub fn new(config: PolicyConfig) -> WardenResult<Self> {
        let pattern = Regex::new(&config.allowed_file_regex).map_err(|e| WardenError::ConfigError {
            reason: format!(
                "invalid allowed_file_regex '{}': {}",
                config.allowed_file_regex, e
            ),
        })?;
        Ok(Self { config, pattern })
    }

    /// Parse `s` as TOML and build a `RulePolicy`.
    pub fn from_toml_str(s: &str) -> WardenResult<Self> {
        let config: PolicyConfig = toml::from_str(s).map_err(|e| WardenError::ConfigError {
            reason: format!("failed to parse policy TOML: {}", e),
        })?;
        Self::new(config)
    }

    /// Read the file at `path` and parse it as TOML policy configuration.
    pub fn from_file(path: &Path) -> WardenResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| WardenError::ConfigError {
            reason: format!("failed to read policy file '{}': {}", path.display(), e),
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn config(&self) -> &PolicyConfig {
        &self.config
    }
}

impl AdmissionPolicy for RulePolicy {
    fn admit_filename(&self, filename: &str) -> WardenResult<()> {
        if self.pattern.is_match(filename) {
            debug!(filename = %filename, "file name admitted");
            return Ok(());
        }

        warn!(
            filename = %filename,
            pattern = %self.config.allowed_file_regex,
            "file name does not match allow-pattern"
        );
        Err(WardenError::InvalidResource {
            reason: format!("file name '{}' is not allowed", filename),
        })
    }

    fn admit_location(&self, source_root: &Path, candidate: &Path) -> WardenResult<()> {
        // Component-wise prefix: `/inbox-evil` does not start with `/inbox`.
        if candidate.starts_with(source_root) && candidate != source_root {
            return Ok(());
        }

        warn!(
            root = %source_root.display(),
            candidate = %candidate.display(),
            "resolved path escapes source directory"
        );
        Err(WardenError::FileNotFound {
            resource: candidate
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
        })
    }

    fn admit_size(&self, size_bytes: u64) -> WardenResult<()> {
        let ceiling = self.config.max_size_bytes();
        if size_bytes <= ceiling {
            return Ok(());
        }

        warn!(size_bytes, ceiling, "file exceeds size ceiling");
        Err(WardenError::InvalidResource {
            reason: format!(
                "file is {} bytes, ceiling is {} MB",
                size_bytes, self.config.max_file_size_mb
            ),
        })
    }
}
