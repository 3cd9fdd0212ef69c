//! Canonical entry codec.
//!
//! Every ledger line is rendered from a fixed schema: fifteen fields in a
//! fixed order, each coerced to its declared type, absent or `null` values
//! replaced by the field default.  Two logically equal inputs always render
//! to the same bytes, whatever extra keys they carry or omit.  The hash
//! chain depends on this.
//!
//! Coercion rules:
//!   - text     string as-is; any other JSON value as its JSON text
//!   - integer  integers as-is; floats truncated; numeric strings parsed;
//!              booleans as 0/1; anything else 0
//!   - list     arrays keep their order, non-string items become JSON text;
//!              a scalar becomes a one-element list
//!   - snippet  text, then truncated to `SNIPPET_MAX_BYTES`

use serde_json::{Map, Value};

/// Largest UTF-8 byte length of a stored stdout/stderr snippet.
pub const SNIPPET_MAX_BYTES: usize = 4096;

/// Appended to a snippet that was cut.  12 bytes.
pub const TRUNCATION_SUFFIX: &str = "…TRUNCATED";

#[derive(Debug, Clone, Copy)]
enum Kind {
    Text(&'static str),
    Integer(i64),
    List,
    Snippet,
}

/// The hashed fields, in canonical order.  `entry_hash` is appended after
/// these on disk and is never part of its own hash input.
const SCHEMA: [(&str, Kind); 15] = [
    ("execution_id", Kind::Text("")),
    ("status", Kind::Text("")),
    ("mode", Kind::Text("observe")),
    ("timestamp", Kind::Text("")),
    ("file", Kind::Text("")),
    ("file_hash_before", Kind::Text("")),
    ("outcome", Kind::Text("NONE")),
    ("pid", Kind::Integer(0)),
    ("exit_code", Kind::Integer(-1)),
    ("failure_category", Kind::Text("NONE")),
    ("stdout_snippet", Kind::Snippet),
    ("stderr_snippet", Kind::Snippet),
    ("runtime_ms", Kind::Integer(0)),
    ("errors", Kind::List),
    ("previous_entry_hash", Kind::Text("GENESIS")),
];

/// Names of the hashed fields, in canonical order.
pub fn field_names() -> impl Iterator<Item = &'static str> {
    SCHEMA.iter().map(|(name, _)| *name)
}

/// Render `fields` as a compact JSON object in canonical form.
///
/// Keys outside the schema, `entry_hash` included, are ignored.
pub fn canonicalize(fields: &Map<String, Value>) -> String {
    let mut out = String::with_capacity(512);
    out.push('{');
    for (i, (name, kind)) in SCHEMA.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        let value = coerce(*kind, fields.get(*name));
        out.push('"');
        out.push_str(name);
        out.push_str("\":");
        out.push_str(&value.to_string());
    }
    out.push('}');
    out
}

/// Cut `text` to at most `SNIPPET_MAX_BYTES`, ending with
/// `TRUNCATION_SUFFIX` when anything was removed.  Never splits a
/// multi-byte character.
pub fn truncate_snippet(text: &str) -> String {
    if text.len() <= SNIPPET_MAX_BYTES {
        return text.to_string();
    }

    let mut cut = SNIPPET_MAX_BYTES - TRUNCATION_SUFFIX.len();
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }

    let mut out = String::with_capacity(cut + TRUNCATION_SUFFIX.len());
    out.push_str(&text[..cut]);
    out.push_str(TRUNCATION_SUFFIX);
    out
}

fn coerce(kind: Kind, value: Option<&Value>) -> Value {
    let value = match value {
        None | Some(Value::Null) => return default_for(kind),
        Some(value) => value,
    };

    match kind {
        Kind::Text(_) => Value::String(as_text(value)),
        Kind::Snippet => Value::String(truncate_snippet(&as_text(value))),
        Kind::Integer(_) => Value::from(as_integer(value)),
        Kind::List => match value {
            Value::Array(items) => Value::Array(
                items
                    .iter()
                    .map(|item| Value::String(as_text(item)))
                    .collect(),
            ),
            scalar => Value::Array(vec![Value::String(as_text(scalar))]),
        },
    }
}

fn default_for(kind: Kind) -> Value {
    match kind {
        Kind::Text(default) => Value::String(default.to_string()),
        Kind::Integer(default) => Value::from(default),
        Kind::List => Value::Array(Vec::new()),
        Kind::Snippet => Value::String(String::new()),
    }
}

fn as_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn as_integer(value: &Value) -> i64 {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_u64().map(|u| i64::try_from(u).unwrap_or(i64::MAX)))
            .or_else(|| n.as_f64().map(|f| f as i64))
            .unwrap_or(0),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().filter(|f| f.is_finite()).map(|f| f as i64))
                .unwrap_or(0)
        }
        Value::Bool(b) => i64::from(*b),
        _ => 0,
    }
}
