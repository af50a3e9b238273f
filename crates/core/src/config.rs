// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Loose-config helpers.
//!
//! Step and job configs arrive as untyped JSON maps produced by
//! upstream config readers, which are sloppy about numeric types
//! (integers may arrive as floats) and list element types. Workers
//! validate through these helpers at the boundary and are strongly
//! typed past it.

use serde_json::Value;

/// Untyped key→value map used for job/step config and metadata.
pub type ConfigMap = serde_json::Map<String, Value>;

/// String value for `key`, if present and a string.
pub fn get_str<'a>(map: &'a ConfigMap, key: &str) -> Option<&'a str> {
    map.get(key).and_then(Value::as_str)
}

/// Unsigned integer for `key`. Accepts integer and float encodings;
/// floats are truncated. Negative values are rejected.
pub fn get_u64(map: &ConfigMap, key: &str) -> Option<u64> {
    match map.get(key)? {
        Value::Number(n) => {
            if let Some(u) = n.as_u64() {
                Some(u)
            } else {
                n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64)
            }
        }
        _ => None,
    }
}

/// Float for `key`. Accepts integer and float encodings.
pub fn get_f64(map: &ConfigMap, key: &str) -> Option<f64> {
    map.get(key).and_then(Value::as_f64)
}

/// Boolean for `key`; absent or non-boolean values default to `false`.
pub fn get_bool(map: &ConfigMap, key: &str) -> bool {
    map.get(key).and_then(Value::as_bool).unwrap_or(false)
}

/// String list for `key`.
///
/// Accepts a list of strings or a list of mixed values with string
/// elements; non-string elements are skipped. Absent or non-list
/// values yield an empty vec.
pub fn get_str_list(map: &ConfigMap, key: &str) -> Vec<String> {
    match map.get(key) {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        _ => Vec::new(),
    }
}

/// Nested object for `key`.
pub fn get_object<'a>(map: &'a ConfigMap, key: &str) -> Option<&'a ConfigMap> {
    map.get(key).and_then(Value::as_object)
}

/// List of objects for `key` (e.g. template variable sets).
pub fn get_object_list<'a>(map: &'a ConfigMap, key: &str) -> Vec<&'a ConfigMap> {
    match map.get(key) {
        Some(Value::Array(items)) => items.iter().filter_map(Value::as_object).collect(),
        _ => Vec::new(),
    }
}

/// Shallow-merge `patch` into `base`; keys in `patch` win, `null`
/// values delete.
pub fn merge_patch(base: &mut ConfigMap, patch: ConfigMap) {
    for (key, value) in patch {
        if value.is_null() {
            base.remove(&key);
        } else {
            base.insert(key, value);
        }
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
