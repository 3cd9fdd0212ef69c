//! Hash-chain primitives: sealing and chain integrity verification.
//!
//! Hash input: the canonical rendering of an entry with its
//! `previous_entry_hash` set to the predecessor's `entry_hash` (or
//! `GENESIS`).  The stored line is that same rendering with
//! `"entry_hash":"<hex>"` appended as the final key.
//!
//! Verification is strict: a line must parse, link to the running
//! expectation, hash to its stored `entry_hash`, AND be byte-identical to
//! its own canonical re-rendering.  The last rule catches edits that the
//! codec would otherwise normalize away (a renamed key falling back to its
//! default, for instance).

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use warden_contracts::{LedgerRecord, WardenError, WardenResult};

use crate::canonical::canonicalize;

/// A canonical line ready to be appended, with its hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedLine {
    pub line: String,
    pub entry_hash: String,
}

/// SHA-256 over the canonical form of `fields` linked to `previous_entry_hash`.
///
/// Any `previous_entry_hash` or `entry_hash` already present in `fields` is
/// ignored.  Returns a lowercase 64-character hex string.
pub fn hash_entry(previous_entry_hash: &str, fields: &Map<String, Value>) -> String {
    hash_canonical(&linked_canonical(previous_entry_hash, fields))
}

/// Seal `fields` onto a chain whose tail hash is `previous_entry_hash`.
pub fn seal(previous_entry_hash: &str, fields: &Map<String, Value>) -> SealedLine {
    let canonical = linked_canonical(previous_entry_hash, fields);
    let entry_hash = hash_canonical(&canonical);
    SealedLine {
        line: attach_hash(&canonical, &entry_hash),
        entry_hash,
    }
}

/// Verify a sequence of `(line_number, line)` pairs as one chain starting
/// at `GENESIS`.
///
/// Blank lines are skipped.  Returns the number of verified entries, or
/// `IntegrityViolation` naming the first offending line.
pub fn verify_lines<'a, I>(lines: I) -> WardenResult<usize>
where
    I: IntoIterator<Item = (usize, &'a str)>,
{
    let mut expected_prev = LedgerRecord::GENESIS.to_string();
    let mut verified = 0;

    for (line_no, line) in lines {
        if line.trim().is_empty() {
            continue;
        }

        let violation = |reason: &str| WardenError::IntegrityViolation {
            line: line_no,
            reason: reason.to_string(),
        };

        let fields: Map<String, Value> =
            serde_json::from_str(line).map_err(|_| violation("unparsable entry"))?;

        if fields.get("previous_entry_hash").and_then(Value::as_str) != Some(expected_prev.as_str()) {
            return Err(violation("chain broken"));
        }

        let stored = fields
            .get("entry_hash")
            .and_then(Value::as_str)
            .ok_or_else(|| violation("missing entry_hash"))?;

        let sealed = seal(&expected_prev, &fields);
        if sealed.entry_hash != stored {
            return Err(violation("hash mismatch"));
        }
        if sealed.line != line {
            return Err(violation("entry is not in canonical form"));
        }

        expected_prev = sealed.entry_hash;
        verified += 1;
    }

    Ok(verified)
}

fn linked_canonical(previous_entry_hash: &str, fields: &Map<String, Value>) -> String {
    let mut linked = fields.clone();
    linked.remove("entry_hash");
    linked.insert(
        "previous_entry_hash".to_string(),
        Value::String(previous_entry_hash.to_string()),
    );
    canonicalize(&linked)
}

fn hash_canonical(canonical: &str) -> String {
    hex::encode(Sha256::digest(canonical.as_bytes()))
}

fn attach_hash(canonical: &str, entry_hash: &str) -> String {
    // Canonical output always ends with the closing brace of the object.
    let body = canonical.strip_suffix('}').unwrap_or(canonical);
    format!("{body},\"entry_hash\":\"{entry_hash}\"}}")
}
