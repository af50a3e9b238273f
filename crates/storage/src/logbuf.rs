// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-job log ring buffer.

use fg_core::{JobId, JobLogEntry};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};

const DEFAULT_CAPACITY: usize = 1_000;

/// Bounded, append-only log retention per job id.
///
/// Append order per job is preserved (the job manager is the single
/// writer per id). When a job's ring fills, the oldest lines drop.
pub struct LogBuffer {
    capacity: usize,
    inner: Mutex<HashMap<JobId, VecDeque<JobLogEntry>>>,
}

impl Default for LogBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl LogBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: Mutex::new(HashMap::new()),
        }
    }

    pub fn append(&self, entry: JobLogEntry) {
        let mut inner = self.inner.lock();
        let ring = inner.entry(entry.job_id.clone()).or_default();
        if ring.len() == self.capacity {
            ring.pop_front();
        }
        ring.push_back(entry);
    }

    /// Last `n` entries for a job, oldest first.
    pub fn tail(&self, job_id: &JobId, n: usize) -> Vec<JobLogEntry> {
        let inner = self.inner.lock();
        match inner.get(job_id) {
            Some(ring) => ring.iter().rev().take(n).rev().cloned().collect(),
            None => Vec::new(),
        }
    }

    /// All retained entries across a run, ordered by append time.
    pub fn for_root(&self, root_id: &JobId) -> Vec<JobLogEntry> {
        let inner = self.inner.lock();
        let mut entries: Vec<JobLogEntry> = inner
            .values()
            .flatten()
            .filter(|e| &e.root_parent_id == root_id)
            .cloned()
            .collect();
        entries.sort_by_key(|e| e.at_ms);
        entries
    }

    pub fn len(&self, job_id: &JobId) -> usize {
        self.inner.lock().get(job_id).map_or(0, VecDeque::len)
    }

    pub fn is_empty(&self, job_id: &JobId) -> bool {
        self.len(job_id) == 0
    }
}

#[cfg(test)]
#[path = "logbuf_tests.rs"]
mod tests;
