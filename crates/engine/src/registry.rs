// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker registry: planner and executor lookup.

use crate::worker::{DefinitionWorker, JobWorker};
use fg_core::WorkerKind;
use parking_lot::RwLock;
use smol_str::SmolStr;
use std::collections::HashMap;
use std::sync::Arc;

/// Two keyed maps: definition workers (planners) by [`WorkerKind`] and
/// job workers (executors) by queue job kind string.
///
/// A single concrete worker may implement both interfaces and be
/// registered in both maps, potentially under different keys.
/// Registration is last-write-wins; lookups are O(1).
#[derive(Default)]
pub struct WorkerRegistry {
    planners: RwLock<HashMap<WorkerKind, Arc<dyn DefinitionWorker>>>,
    executors: RwLock<HashMap<SmolStr, Arc<dyn JobWorker>>>,
}

impl WorkerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_planner(&self, worker: Arc<dyn DefinitionWorker>) {
        let kind = worker.kind();
        if self
            .planners
            .write()
            .insert(kind.clone(), worker)
            .is_some()
        {
            tracing::warn!(%kind, "planner re-registered, previous dropped");
        }
    }

    pub fn register_executor(&self, worker: Arc<dyn JobWorker>) {
        let kind = SmolStr::new(worker.queue_kind());
        if self
            .executors
            .write()
            .insert(kind.clone(), worker)
            .is_some()
        {
            tracing::warn!(%kind, "executor re-registered, previous dropped");
        }
    }

    pub fn planner(&self, kind: &WorkerKind) -> Option<Arc<dyn DefinitionWorker>> {
        self.planners.read().get(kind).cloned()
    }

    pub fn executor(&self, kind: &str) -> Option<Arc<dyn JobWorker>> {
        self.executors.read().get(kind).cloned()
    }

    pub fn planner_kinds(&self) -> Vec<WorkerKind> {
        self.planners.read().keys().cloned().collect()
    }

    pub fn executor_kinds(&self) -> Vec<SmolStr> {
        self.executors.read().keys().cloned().collect()
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
