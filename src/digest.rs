//! src/digest.rs
//!
//! Deterministic fingerprinting of a `Record`. This is used only to let two
//! nodes agree "we both have the same version of this data" (the quorum-read
//! protocol and, conceptually, anti-entropy convergence checks) — it is not
//! an authenticator and makes no tamper-resistance claim.

use serde_json::Value;
use sha2::{Digest as _, Sha256};

use crate::domain::Record;

/// Computes the digest of a record: serialize with `digest` cleared, using
/// a canonical (key-sorted) JSON form, then SHA-256 and lowercase-hex encode.
///
/// Byte-identical records (modulo the `digest` field itself) always yield
/// the same digest; any other field change yields a different one with
/// overwhelming probability.
pub fn digest(record: &Record) -> String {
    let mut cleared = record.clone();
    cleared.digest = String::new();
    let value = serde_json::to_value(&cleared).expect("Record is always serializable");
    let canonical = canonical_json(&value);
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    hex::encode(hasher.finalize())
}

/// Renders a `serde_json::Value` as a string with object keys sorted
/// lexicographically at every nesting level, mirroring the original
/// implementation's `json.dumps(obj, sort_keys=True)`.
fn canonical_json(value: &Value) -> String {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut out = String::from("{");
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&serde_json::to_string(key).expect("string keys are serializable"));
                out.push(':');
                out.push_str(&canonical_json(&map[*key]));
            }
            out.push('}');
            out
        }
        Value::Array(items) => {
            let mut out = String::from("[");
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&canonical_json(item));
            }
            out.push(']');
            out
        }
        other => other.to_string(),
    }
}
