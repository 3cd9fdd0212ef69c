//! # warden-policy
//!
//! TOML-configured file admission rules for the Warden governor.
//!
//! ## Overview
//!
//! This crate provides [`RulePolicy`], which implements the
//! [`AdmissionPolicy`](warden_core::traits::AdmissionPolicy) trait.  The
//! policy is static: an allow-pattern for file names, path confinement to
//! the source directory, and a size ceiling.  Policies do no I/O; the
//! governor resolves paths and reads metadata before asking.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use warden_policy::{PolicyConfig, RulePolicy};
//!
//! let policy = RulePolicy::new(PolicyConfig::default())?;
//! // Pass `Arc::new(policy)` to `warden_core::Governor::new(...)`.
//! ```

pub mod engine;
pub mod rule;

pub use engine::RulePolicy;
pub use rule::{PolicyConfig, DEFAULT_ALLOWED_FILE_REGEX, DEFAULT_MAX_FILE_SIZE_MB};

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::path::Path;

    use warden_contracts::{ErrorCode, WardenError};
    use warden_core::traits::AdmissionPolicy;

    use crate::{PolicyConfig, RulePolicy};

    // ── Helpers ───────────────────────────────────────────────────────────────

    fn default_policy() -> RulePolicy {
        RulePolicy::new(PolicyConfig::default()).unwrap()
    }

    // ── 1. file names ─────────────────────────────────────────────────────────

    #[test]
    fn test_default_pattern_admits_plain_pdf_names() {
        let policy = default_policy();
        for name in ["invoice.pdf", "scan_2024-01.v2.pdf", "A.pdf"] {
            assert!(policy.admit_filename(name).is_ok(), "{name} should be admitted");
        }
    }

    #[test]
    fn test_default_pattern_rejects_other_names() {
        let policy = default_policy();
        for name in ["notes.txt", "../etc/passwd.pdf", "a b.pdf", "invoice.PDF", ".pdf", ""] {
            let err = policy.admit_filename(name).unwrap_err();
            assert_eq!(err.code(), ErrorCode::InvalidResource, "{name:?}");
        }
    }

    #[test]
    fn test_listing_uses_the_same_pattern() {
        let policy = default_policy();
        assert!(policy.is_listable("invoice.pdf"));
        assert!(!policy.is_listable("invoice.docx"));
    }

    // ── 2. location ───────────────────────────────────────────────────────────

    #[test]
    fn test_location_inside_root_is_admitted() {
        let policy = default_policy();
        assert!(policy
            .admit_location(Path::new("/srv/inbox"), Path::new("/srv/inbox/a.pdf"))
            .is_ok());
    }

    #[test]
    fn test_location_outside_root_is_not_found() {
        let policy = default_policy();
        for candidate in ["/srv/secret.pdf", "/srv/inbox-evil/a.pdf", "/srv/inbox"] {
            let err = policy
                .admit_location(Path::new("/srv/inbox"), Path::new(candidate))
                .unwrap_err();
            assert!(
                matches!(err, WardenError::FileNotFound { .. }),
                "{candidate} should be rejected, got {:?}",
                err
            );
        }
    }

    // ── 3. size ───────────────────────────────────────────────────────────────

    #[test]
    fn test_size_ceiling_is_inclusive() {
        let policy = RulePolicy::from_toml_str("max_file_size_mb = 1").unwrap();
        assert!(policy.admit_size(1024 * 1024).is_ok());
        let err = policy.admit_size(1024 * 1024 + 1).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidResource);
    }

    // ── 4. configuration ──────────────────────────────────────────────────────

    #[test]
    fn test_empty_toml_yields_defaults() {
        let policy = RulePolicy::from_toml_str("").unwrap();
        assert_eq!(policy.config(), &PolicyConfig::default());
        assert_eq!(policy.config().max_file_size_mb, 50);
    }

    #[test]
    fn test_custom_pattern_from_toml() {
        let toml = r#"
            allowed_file_regex = '^[a-z]+\.tiff?$'
            max_file_size_mb = 5
        "#;
        let policy = RulePolicy::from_toml_str(toml).unwrap();
        assert!(policy.admit_filename("scan.tif").is_ok());
        assert!(policy.admit_filename("scan.pdf").is_err());
    }

    #[test]
    fn test_invalid_regex_is_config_error() {
        let err = RulePolicy::from_toml_str("allowed_file_regex = '(unclosed'").unwrap_err();
        assert_eq!(err.code(), ErrorCode::ConfigError);
    }

    #[test]
    fn test_malformed_toml_is_config_error() {
        let err = RulePolicy::from_toml_str("max_file_size_mb = \"lots\"").unwrap_err();
        assert!(matches!(err, WardenError::ConfigError { .. }));
    }

    #[test]
    fn test_missing_policy_file_is_config_error() {
        let err = RulePolicy::from_file(Path::new("/nonexistent/policy.toml")).unwrap_err();
        assert!(matches!(err, WardenError::ConfigError { .. }));
    }
}
