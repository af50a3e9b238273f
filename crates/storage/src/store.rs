// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job store: persistent job rows with parent/child indices.

use crate::error::StoreError;
use fg_core::{ChildStats, Job, JobId};
use parking_lot::Mutex;
use std::collections::HashMap;

/// Persistent home of job rows.
///
/// The job manager is the sole writer; reads are open to everyone.
/// `update` applies a closure under the store lock, which is what
/// serializes mutations per job id.
pub trait JobStore: Send + Sync {
    /// Insert a new row. Fails with `Conflict` on a duplicate id.
    fn insert(&self, job: Job) -> Result<(), StoreError>;

    fn get(&self, id: &JobId) -> Result<Option<Job>, StoreError>;

    /// Mutate one row in place; returns the updated row.
    fn update(
        &self,
        id: &JobId,
        mutate: &mut dyn FnMut(&mut Job),
    ) -> Result<Job, StoreError>;

    /// Direct children of `parent_id`, in creation order.
    fn children(&self, parent_id: &JobId) -> Result<Vec<Job>, StoreError>;

    /// Status rollup of direct children, per requested parent.
    fn child_stats(
        &self,
        parent_ids: &[JobId],
    ) -> Result<HashMap<JobId, ChildStats>, StoreError>;

    /// Every row, unordered. Debug/UI surface, not a hot path.
    fn list(&self) -> Result<Vec<Job>, StoreError>;
}

#[derive(Default)]
struct StoreInner {
    jobs: HashMap<JobId, Job>,
    /// Child ids per parent, in insertion order.
    by_parent: HashMap<JobId, Vec<JobId>>,
}

/// In-memory job store.
#[derive(Default)]
pub struct MemoryJobStore {
    inner: Mutex<StoreInner>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl JobStore for MemoryJobStore {
    fn insert(&self, job: Job) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        if inner.jobs.contains_key(&job.id) {
            return Err(StoreError::Conflict(job.id));
        }
        if let Some(parent) = &job.parent_id {
            inner
                .by_parent
                .entry(parent.clone())
                .or_default()
                .push(job.id.clone());
        }
        inner.jobs.insert(job.id.clone(), job);
        Ok(())
    }

    fn get(&self, id: &JobId) -> Result<Option<Job>, StoreError> {
        Ok(self.inner.lock().jobs.get(id).cloned())
    }

    fn update(
        &self,
        id: &JobId,
        mutate: &mut dyn FnMut(&mut Job),
    ) -> Result<Job, StoreError> {
        let mut inner = self.inner.lock();
        let job = inner
            .jobs
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;
        mutate(job);
        Ok(job.clone())
    }

    fn children(&self, parent_id: &JobId) -> Result<Vec<Job>, StoreError> {
        let inner = self.inner.lock();
        let ids = match inner.by_parent.get(parent_id) {
            Some(ids) => ids,
            None => return Ok(Vec::new()),
        };
        Ok(ids
            .iter()
            .filter_map(|id| inner.jobs.get(id).cloned())
            .collect())
    }

    fn child_stats(
        &self,
        parent_ids: &[JobId],
    ) -> Result<HashMap<JobId, ChildStats>, StoreError> {
        let inner = self.inner.lock();
        let mut out = HashMap::with_capacity(parent_ids.len());
        for parent in parent_ids {
            let mut stats = ChildStats::default();
            if let Some(ids) = inner.by_parent.get(parent) {
                for id in ids {
                    let Some(job) = inner.jobs.get(id) else {
                        continue;
                    };
                    stats.child_count += 1;
                    match job.status {
                        fg_core::JobStatus::Completed => stats.completed += 1,
                        fg_core::JobStatus::Failed => stats.failed += 1,
                        fg_core::JobStatus::Cancelled => stats.cancelled += 1,
                        fg_core::JobStatus::Running => stats.running += 1,
                        fg_core::JobStatus::Pending => {}
                    }
                }
            }
            out.insert(parent.clone(), stats);
        }
        Ok(out)
    }

    fn list(&self) -> Result<Vec<Job>, StoreError> {
        Ok(self.inner.lock().jobs.values().cloned().collect())
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
