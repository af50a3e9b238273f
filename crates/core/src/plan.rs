// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Planner output: the work a step discovered and how to run it.

use crate::config::ConfigMap;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

/// How a planner intends its work to execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpawnStrategy {
    /// All work happens inside `create_jobs`; no children.
    Inline,
    /// Children are enqueued and run concurrently.
    Parallel,
    /// Children are enqueued and polled to completion.
    Async,
}

crate::simple_display! {
    SpawnStrategy {
        Inline => "inline",
        Parallel => "parallel",
        Async => "async",
    }
}

/// One unit of work discovered during Init.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkItem {
    /// Stable identifier within the plan (url, document id, …).
    pub id: String,
    pub name: String,
    /// Queue job kind the item executes as.
    pub kind: SmolStr,
    #[serde(default)]
    pub config: ConfigMap,
}

impl WorkItem {
    pub fn new(id: impl Into<String>, name: impl Into<String>, kind: impl Into<SmolStr>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind: kind.into(),
            config: ConfigMap::new(),
        }
    }

    crate::setters! {
        set {
            config: ConfigMap,
        }
    }
}

/// Complete plan returned by a planner's Init.
///
/// `metadata` carries discovery state forward to `create_jobs`
/// (resolved secrets, query results, fetched seed pages) so the
/// planner does not repeat its I/O.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitPlan {
    pub work_items: Vec<WorkItem>,
    pub total_count: usize,
    pub strategy: SpawnStrategy,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_concurrency: Option<u32>,
    #[serde(default)]
    pub metadata: ConfigMap,
}

impl InitPlan {
    /// Single inline work item; the step runs inside `create_jobs`.
    pub fn inline(name: impl Into<String>) -> Self {
        let item = WorkItem::new("inline", name, "inline");
        Self {
            work_items: vec![item],
            total_count: 1,
            strategy: SpawnStrategy::Inline,
            suggested_concurrency: None,
            metadata: ConfigMap::new(),
        }
    }

    pub fn parallel(work_items: Vec<WorkItem>) -> Self {
        Self {
            total_count: work_items.len(),
            work_items,
            strategy: SpawnStrategy::Parallel,
            suggested_concurrency: None,
            metadata: ConfigMap::new(),
        }
    }

    pub fn r#async(work_items: Vec<WorkItem>) -> Self {
        Self {
            total_count: work_items.len(),
            work_items,
            strategy: SpawnStrategy::Async,
            suggested_concurrency: None,
            metadata: ConfigMap::new(),
        }
    }

    crate::setters! {
        set {
            metadata: ConfigMap,
        }
        option {
            suggested_concurrency: u32,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.work_items.is_empty()
    }
}

#[cfg(test)]
#[path = "plan_tests.rs"]
mod tests;
