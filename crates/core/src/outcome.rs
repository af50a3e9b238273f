// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-step result aggregation.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// What a worker produced, aggregated per step into step metadata.
///
/// Leaf executors record their own result on their job record; the
/// orchestrator folds child results into the step's, keyed by child
/// name under `by_key`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkerResult {
    #[serde(default)]
    pub documents_created: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub document_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_type: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub source_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
    /// Sub-results keyed by work item (document, ticker, url, …).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub by_key: BTreeMap<String, WorkerResult>,
}

impl WorkerResult {
    /// Fold `other` into this result, concatenating lists and summing
    /// counters. `source_type` keeps the first non-empty value.
    pub fn merge(&mut self, other: WorkerResult) {
        self.documents_created += other.documents_created;
        self.document_ids.extend(other.document_ids);
        for tag in other.tags {
            if !self.tags.contains(&tag) {
                self.tags.push(tag);
            }
        }
        if self.source_type.is_none() {
            self.source_type = other.source_type;
        }
        self.source_ids.extend(other.source_ids);
        self.errors.extend(other.errors);
        for (key, sub) in other.by_key {
            match self.by_key.get_mut(&key) {
                Some(existing) => existing.merge(sub),
                None => {
                    self.by_key.insert(key, sub);
                }
            }
        }
    }

    /// Fold a child's result in under `key`, also rolling its counters
    /// into the step totals.
    pub fn merge_keyed(&mut self, key: impl Into<String>, child: WorkerResult) {
        let mut flat = child.clone();
        flat.by_key.clear();
        self.merge(flat);
        let key = key.into();
        match self.by_key.get_mut(&key) {
            Some(existing) => existing.merge(child),
            None => {
                self.by_key.insert(key, child);
            }
        }
    }

    pub fn to_value(&self) -> Option<serde_json::Value> {
        serde_json::to_value(self).ok()
    }

    pub fn from_value(value: &serde_json::Value) -> Option<Self> {
        serde_json::from_value(value.clone()).ok()
    }
}

#[cfg(test)]
#[path = "outcome_tests.rs"]
mod tests;
