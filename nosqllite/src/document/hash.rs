// Canonical encoding and content digests for document data

use serde_json::Value;
use sha2::{Digest, Sha256};

/// Hex-encoded SHA-256 digest of a value.
///
/// Objects and arrays are digested through [`canonical_json`], so two values
/// that are structurally equal hash the same regardless of key insertion
/// order. Scalars are digested through their display form: strings as their
/// raw contents, everything else as JSON text.
pub fn content_hash(value: &Value) -> String {
    let encoded = match value {
        Value::Object(_) | Value::Array(_) => canonical_json(value),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };

    let mut hasher = Sha256::new();
    hasher.update(encoded.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Stable JSON text for a value: keys sorted, `", "` and `": "` separators,
/// non-ASCII characters escaped as `\uXXXX`.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    escape_non_ascii(&out)
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|(a, _), (b, _)| a.cmp(b));

            out.push('{');
            for (i, (key, val)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push_str(": ");
                write_canonical(val, out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

/// Non-ASCII characters only ever appear inside string literals of the
/// encoded text, so escaping them here never touches structure.
fn escape_non_ascii(encoded: &str) -> String {
    if encoded.is_ascii() {
        return encoded.to_string();
    }

    let mut out = String::with_capacity(encoded.len() + 16);
    let mut units = [0u16; 2];
    for ch in encoded.chars() {
        if ch.is_ascii() {
            out.push(ch);
        } else {
            for unit in ch.encode_utf16(&mut units) {
                out.push_str(&format!("\\u{:04x}", unit));
            }
        }
    }
    out
}
