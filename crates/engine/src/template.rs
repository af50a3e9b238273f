// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Template placeholder interpolation.
//!
//! Placeholders look like `{ns:key}`, `{ns:key_lower}`, `{ns:key_upper}`.
//! Lookup tries the exact key first, then strips a trailing modifier
//! and applies it to the looked-up value. Missing keys leave the
//! placeholder verbatim and are reported back for warn-level logging.

use fg_core::ConfigMap;
use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;

/// Regex pattern for {namespace:key} with optional _lower/_upper modifier
// Allow expect here as the regex is compile-time verified to be valid
#[allow(clippy::expect_used)]
static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{([a-z][a-z0-9_]*):([A-Za-z0-9_.-]+)\}")
        .expect("constant regex pattern is valid")
});

/// Result of one interpolation pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rendered {
    pub text: String,
    /// Placeholders left verbatim because no value was found.
    pub missing: Vec<String>,
}

/// Interpolate placeholders from a `"ns:key" → value` map.
pub fn render(template: &str, vars: &HashMap<String, String>) -> Rendered {
    let mut missing = Vec::new();
    let text = PLACEHOLDER
        .replace_all(template, |caps: &regex::Captures| {
            let ns = &caps[1];
            let raw_key = &caps[2];
            let full = format!("{ns}:{raw_key}");

            if let Some(value) = vars.get(&full) {
                return value.clone();
            }
            for (suffix, apply) in [
                ("_lower", str::to_lowercase as fn(&str) -> String),
                ("_upper", str::to_uppercase as fn(&str) -> String),
            ] {
                if let Some(base) = raw_key.strip_suffix(suffix) {
                    if let Some(value) = vars.get(&format!("{ns}:{base}")) {
                        return apply(value);
                    }
                }
            }
            missing.push(full);
            caps[0].to_string()
        })
        .into_owned();
    Rendered { text, missing }
}

/// Merge job-level variable globals with a step/expansion set;
/// the step set wins on key clash.
pub fn merge_variables(job_vars: &ConfigMap, step_vars: &ConfigMap) -> ConfigMap {
    let mut merged = job_vars.clone();
    for (key, value) in step_vars {
        merged.insert(key.clone(), value.clone());
    }
    merged
}

/// Flatten a variable set into `"ns:key" → string` lookup entries.
///
/// Non-string scalars stringify; nested values are skipped.
pub fn namespace_vars(ns: &str, set: &ConfigMap) -> HashMap<String, String> {
    let mut out = HashMap::with_capacity(set.len());
    for (key, value) in set {
        let rendered = match value {
            serde_json::Value::String(s) => s.clone(),
            serde_json::Value::Number(n) => n.to_string(),
            serde_json::Value::Bool(b) => b.to_string(),
            _ => continue,
        };
        out.insert(format!("{ns}:{key}"), rendered);
    }
    out
}

#[cfg(test)]
#[path = "template_tests.rs"]
mod tests;
