//! # warden-audit
//!
//! Immutable, append-only, SHA-256 hash-chained audit ledger for the Warden
//! governor.
//!
//! ## Overview
//!
//! Every state transition of every execution is rendered by the canonical
//! codec into a fixed-schema JSON line and linked to the previous line via
//! its SHA-256 hash.  Tampering with any line, even a single byte, breaks
//! the chain and is reported by `verify_chain` with the line number.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use warden_audit::FileLedger;
//! use warden_core::traits::AuditLedger;
//!
//! let ledger = FileLedger::open("logs/warden-audit.log")?;
//! ledger.verify_chain()?;
//! let record = ledger.append(entry)?;
//! ```

pub mod canonical;
pub mod chain;
pub mod ledger;

pub use canonical::{canonicalize, truncate_snippet, SNIPPET_MAX_BYTES, TRUNCATION_SUFFIX};
pub use chain::{hash_entry, seal, verify_lines, SealedLine};
pub use ledger::{FileLedger, RECOVERY_REASON};

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::fs;
    use std::io::Write;
    use std::sync::Arc;

    use serde_json::{json, Map, Value};

    use warden_contracts::{
        AuditEntry, EntryStatus, ExecutionMode, FailureCategory, LedgerRecord, WardenError,
    };
    use warden_core::traits::AuditLedger;

    use super::*;

    // ── Helpers ───────────────────────────────────────────────────────────────

    fn entry(execution_id: &str, status: EntryStatus) -> AuditEntry {
        AuditEntry::new(
            execution_id,
            status,
            ExecutionMode::Live,
            "/inbox/invoice.pdf",
            "9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08",
        )
    }

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    fn ledger_in(dir: &tempfile::TempDir) -> FileLedger {
        FileLedger::open(dir.path().join("logs").join("audit.log")).unwrap()
    }

    fn assert_violation_at(result: Result<usize, WardenError>, expected: usize) {
        match result {
            Err(WardenError::IntegrityViolation { line, .. }) => assert_eq!(line, expected),
            other => panic!("expected IntegrityViolation at line {expected}, got {:?}", other),
        }
    }

    // ── 1. canonical codec ────────────────────────────────────────────────────

    /// Every field is present, in order, with its default.
    #[test]
    fn test_empty_input_renders_all_defaults() {
        let rendered = canonicalize(&Map::new());
        assert_eq!(
            rendered,
            concat!(
                r#"{"execution_id":"","status":"","mode":"observe","timestamp":"","file":"","#,
                r#""file_hash_before":"","outcome":"NONE","pid":0,"exit_code":-1,"#,
                r#""failure_category":"NONE","stdout_snippet":"","stderr_snippet":"","#,
                r#""runtime_ms":0,"errors":[],"previous_entry_hash":"GENESIS"}"#
            )
        );
        assert_eq!(canonical::field_names().count(), 15);
    }

    /// Key order, extra keys, and explicit nulls do not change the output.
    #[test]
    fn test_canonical_form_is_order_and_noise_independent() {
        let a = object(json!({
            "execution_id": "e1", "status": "STARTED", "pid": 42, "errors": ["x"]
        }));
        let b = object(json!({
            "errors": ["x"], "unrelated": true, "pid": 42, "status": "STARTED",
            "execution_id": "e1", "outcome": null, "entry_hash": "ignored"
        }));
        assert_eq!(canonicalize(&a), canonicalize(&b));
    }

    /// Rendering a rendered entry again changes nothing.
    #[test]
    fn test_canonical_form_is_idempotent() {
        let first = canonicalize(&object(json!({
            "execution_id": "e1", "pid": "17", "errors": "boom", "stdout_snippet": 5
        })));
        let reparsed = object(serde_json::from_str(&first).unwrap());
        assert_eq!(canonicalize(&reparsed), first);
    }

    #[test]
    fn test_values_are_coerced_to_field_types() {
        let rendered = object(
            serde_json::from_str(&canonicalize(&object(json!({
                "status": 7,
                "pid": "42",
                "exit_code": 3.9,
                "runtime_ms": "soon",
                "errors": "single",
                "stdout_snippet": {"k": 1},
            }))))
            .unwrap(),
        );

        assert_eq!(rendered["status"], json!("7"));
        assert_eq!(rendered["pid"], json!(42));
        assert_eq!(rendered["exit_code"], json!(3));
        assert_eq!(rendered["runtime_ms"], json!(0));
        assert_eq!(rendered["errors"], json!(["single"]));
        assert_eq!(rendered["stdout_snippet"], json!(r#"{"k":1}"#));

        let list = object(
            serde_json::from_str(&canonicalize(&object(json!({ "errors": [1, "a", true] }))))
                .unwrap(),
        );
        assert_eq!(list["errors"], json!(["1", "a", "true"]));
    }

    // ── 2. snippet truncation ─────────────────────────────────────────────────

    #[test]
    fn test_snippet_at_limit_is_untouched() {
        let text = "a".repeat(SNIPPET_MAX_BYTES);
        assert_eq!(truncate_snippet(&text), text);
    }

    #[test]
    fn test_oversized_snippet_is_cut_to_limit() {
        let cut = truncate_snippet(&"a".repeat(5000));
        assert_eq!(cut.len(), SNIPPET_MAX_BYTES);
        assert!(cut.ends_with(TRUNCATION_SUFFIX));
        assert_eq!(TRUNCATION_SUFFIX.len(), 12);
    }

    /// A cut never lands inside a multi-byte character.
    #[test]
    fn test_truncation_respects_char_boundaries() {
        // 3-byte characters: 4084 is not a boundary, 4083 is.
        let cut = truncate_snippet(&"€".repeat(2000));
        assert!(cut.len() <= SNIPPET_MAX_BYTES);
        assert_eq!(cut.len(), 4083 + TRUNCATION_SUFFIX.len());
        let body = cut.strip_suffix(TRUNCATION_SUFFIX).unwrap();
        assert!(body.chars().all(|c| c == '€'));
        assert_eq!(body.chars().count(), 1361);
    }

    // ── 3. chain primitives ───────────────────────────────────────────────────

    /// Caller-supplied link fields never influence the hash.
    #[test]
    fn test_hash_ignores_supplied_link_fields() {
        let clean = object(json!({ "execution_id": "e1", "status": "STARTED" }));
        let noisy = object(json!({
            "execution_id": "e1", "status": "STARTED",
            "previous_entry_hash": "forged", "entry_hash": "forged"
        }));
        assert_eq!(hash_entry("GENESIS", &clean), hash_entry("GENESIS", &noisy));
        assert_ne!(hash_entry("GENESIS", &clean), hash_entry("abc", &clean));
        assert_eq!(hash_entry("GENESIS", &clean).len(), 64);
    }

    #[test]
    fn test_sealed_line_ends_with_entry_hash() {
        let sealed = seal("GENESIS", &object(json!({ "execution_id": "e1" })));
        let parsed = object(serde_json::from_str(&sealed.line).unwrap());
        assert_eq!(parsed["entry_hash"], json!(sealed.entry_hash));
        assert!(sealed
            .line
            .ends_with(&format!(r#""previous_entry_hash":"GENESIS","entry_hash":"{}"}}"#, sealed.entry_hash)));
        assert_eq!(verify_lines([(1, sealed.line.as_str())]).unwrap(), 1);
    }

    // ── 4. file ledger ────────────────────────────────────────────────────────

    #[test]
    fn test_absent_ledger_verifies_empty() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = ledger_in(&dir);
        assert_eq!(ledger.verify_chain().unwrap(), 0);
        assert!(ledger.latest().unwrap().is_none());
        assert!(ledger.all_for_execution("e1").unwrap().is_empty());
    }

    #[test]
    fn test_appends_link_into_a_chain() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = ledger_in(&dir);

        let first = ledger.append(entry("e1", EntryStatus::Started)).unwrap();
        let second = ledger.append(entry("e1", EntryStatus::Executing).with_pid(4242)).unwrap();
        let third = ledger
            .append(entry("e1", EntryStatus::CompletedSuccess).with_exit_code(0))
            .unwrap();

        assert_eq!(first.previous_entry_hash, LedgerRecord::GENESIS);
        assert_eq!(second.previous_entry_hash, first.entry_hash);
        assert_eq!(third.previous_entry_hash, second.entry_hash);
        assert_eq!(ledger.verify_chain().unwrap(), 3);

        let history = ledger.all_for_execution("e1").unwrap();
        assert_eq!(history, vec![first, second, third.clone()]);
        assert_eq!(ledger.latest().unwrap(), Some(third.clone()));
        assert_eq!(ledger.latest_for_execution("e1").unwrap(), Some(third));
    }

    /// Each stored line is exactly the canonical rendering plus the hash.
    #[test]
    fn test_stored_line_is_canonical() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = ledger_in(&dir);
        let record = ledger.append(entry("e1", EntryStatus::Started)).unwrap();

        let text = fs::read_to_string(ledger.path()).unwrap();
        let line = text.lines().next().unwrap();
        assert!(line.starts_with(r#"{"execution_id":"e1","status":"STARTED","mode":"live","#));
        assert!(line.ends_with(&format!(r#""entry_hash":"{}"}}"#, record.entry_hash)));
        assert!(text.ends_with('\n'));
    }

    #[test]
    fn test_ledger_continues_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let first = ledger_in(&dir).append(entry("e1", EntryStatus::Started)).unwrap();

        let reopened = ledger_in(&dir);
        let second = reopened.append(entry("e1", EntryStatus::CompletedSuccess)).unwrap();

        assert_eq!(second.previous_entry_hash, first.entry_hash);
        assert_eq!(reopened.verify_chain().unwrap(), 2);
    }

    /// Changing any single byte of a stored line is caught at that line.
    #[test]
    fn test_any_byte_tamper_is_detected_at_its_line() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = ledger_in(&dir);
        ledger.append(entry("e1", EntryStatus::Started)).unwrap();
        ledger.append(entry("e1", EntryStatus::Executing).with_pid(99)).unwrap();
        ledger.append(entry("e1", EntryStatus::CompletedSuccess)).unwrap();

        let original = fs::read_to_string(ledger.path()).unwrap();
        let lines: Vec<&str> = original.lines().collect();
        let target = lines[1].as_bytes();

        for i in 0..target.len() {
            let mut bytes = target.to_vec();
            bytes[i] = if bytes[i] == b'a' { b'b' } else { b'a' };
            let tampered = format!(
                "{}\n{}\n{}\n",
                lines[0],
                String::from_utf8(bytes).unwrap(),
                lines[2]
            );
            fs::write(ledger.path(), tampered).unwrap();
            match ledger.verify_chain() {
                Err(WardenError::IntegrityViolation { line, .. }) => {
                    assert_eq!(line, 2, "tamper at byte {i} reported at wrong line")
                }
                other => panic!("tamper at byte {i} not detected: {:?}", other),
            }
        }
    }

    #[test]
    fn test_deleted_line_breaks_the_chain() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = ledger_in(&dir);
        for status in [EntryStatus::Started, EntryStatus::Executing, EntryStatus::Timeout] {
            ledger.append(entry("e1", status)).unwrap();
        }

        let text = fs::read_to_string(ledger.path()).unwrap();
        let kept: Vec<&str> = text.lines().enumerate().filter(|(i, _)| *i != 1).map(|(_, l)| l).collect();
        fs::write(ledger.path(), kept.join("\n") + "\n").unwrap();

        assert_violation_at(ledger.verify_chain(), 2);
    }

    /// A half-written tail fails verification and blocks further appends,
    /// while the lenient queries still return the intact records.
    #[test]
    fn test_partial_tail_line() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = ledger_in(&dir);
        ledger.append(entry("e1", EntryStatus::Started)).unwrap();
        ledger.append(entry("e1", EntryStatus::Executing)).unwrap();

        let mut file = fs::OpenOptions::new().append(true).open(ledger.path()).unwrap();
        file.write_all(br#"{"execution_id":"e1","sta"#).unwrap();
        drop(file);

        assert_violation_at(ledger.verify_chain(), 3);
        assert_eq!(ledger.all_for_execution("e1").unwrap().len(), 2);
        assert_eq!(
            ledger.latest().unwrap().map(|r| r.status()),
            Some(EntryStatus::Executing)
        );

        let err = ledger.append(entry("e2", EntryStatus::Started)).unwrap_err();
        assert!(matches!(err, WardenError::IntegrityViolation { line: 3, .. }));
    }

    #[test]
    fn test_oversized_output_is_truncated_on_append() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = ledger_in(&dir);

        let record = ledger
            .append(
                entry("e1", EntryStatus::CompletedFailure)
                    .with_output("o".repeat(5000), "e".repeat(10))
                    .with_failure(FailureCategory::RuntimeError),
            )
            .unwrap();

        assert_eq!(record.entry.stdout_snippet.len(), SNIPPET_MAX_BYTES);
        assert!(record.entry.stdout_snippet.ends_with(TRUNCATION_SUFFIX));
        assert_eq!(record.entry.stderr_snippet, "e".repeat(10));
        assert_eq!(ledger.verify_chain().unwrap(), 1);
    }

    #[test]
    fn test_concurrent_appends_form_one_chain() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = Arc::new(ledger_in(&dir));

        let handles: Vec<_> = (0..4)
            .map(|t| {
                let ledger = Arc::clone(&ledger);
                std::thread::spawn(move || {
                    for i in 0..10 {
                        ledger
                            .append(entry(&format!("e{t}-{i}"), EntryStatus::Started))
                            .unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(ledger.verify_chain().unwrap(), 40);
    }

    // ── 5. orphan recovery ────────────────────────────────────────────────────

    #[test]
    fn test_recover_orphans_closes_in_flight_executions() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = ledger_in(&dir);

        ledger.append(entry("started", EntryStatus::Started)).unwrap();
        ledger.append(entry("executing", EntryStatus::Started)).unwrap();
        ledger.append(entry("executing", EntryStatus::Executing)).unwrap();
        ledger.append(entry("done", EntryStatus::Started)).unwrap();
        ledger.append(entry("done", EntryStatus::CompletedSuccess)).unwrap();

        let recovered = ledger.recover_orphans(ExecutionMode::Observe).unwrap();
        let ids: Vec<&str> = recovered.iter().map(|r| r.execution_id()).collect();
        assert_eq!(ids, vec!["started", "executing"]);

        for record in &recovered {
            assert_eq!(record.status(), EntryStatus::Recovery);
            assert_eq!(record.entry.outcome, "INTERRUPTED");
            assert_eq!(record.entry.failure_category, FailureCategory::SystemRecovery);
            assert_eq!(record.entry.mode, ExecutionMode::Observe);
            assert_eq!(record.entry.file, "/inbox/invoice.pdf");
            assert_eq!(record.entry.errors, vec![RECOVERY_REASON.to_string()]);
        }

        assert_eq!(ledger.verify_chain().unwrap(), 7);
        assert!(ledger.recover_orphans(ExecutionMode::Observe).unwrap().is_empty());
    }
}
