#![forbid(unsafe_code)]

//! Deterministic text encoding of structured values.
//!
//! Every mapping is emitted with its keys in lexicographic order at every depth,
//! sequences keep their order, and the output ends with a single newline.
//! Encoding a value decoded from canonical text reproduces that text byte for byte.

use serde_json::{Map, Value};

pub fn sort_keys(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys = map.keys().collect::<Vec<_>>();
            keys.sort();
            let mut sorted = Map::with_capacity(map.len());
            for key in keys {
                sorted.insert(key.clone(), sort_keys(&map[key]));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(sort_keys).collect()),
        other => other.clone(),
    }
}

pub fn to_canonical_json(value: &Value) -> Result<String, serde_json::Error> {
    let mut out = serde_json::to_string_pretty(&sort_keys(value))?;
    out.push('\n');
    Ok(out)
}

pub fn to_canonical_yaml(value: &Value) -> Result<String, serde_yaml::Error> {
    let out = serde_yaml::to_string(&sort_keys(value))?;
    if out.ends_with('\n') {
        Ok(out)
    } else {
        Ok(format!("{out}\n"))
    }
}

/// Re-encodes JSON text in canonical form. Fails when `raw` is not valid JSON.
pub fn canonicalize_json_text(raw: &str) -> Result<String, serde_json::Error> {
    let value: Value = serde_json::from_str(raw)?;
    to_canonical_json(&value)
}
