// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Active run cancellation scopes.
//!
//! The orchestrator registers each run's cancellation token under its
//! root manager id; the dispatcher consults the map when it picks up a
//! leaf, so cancelling a run also cancels that run's in-flight
//! executor contexts instead of only stopping step iteration. Scopes
//! deregister on drop; a token cloned out of the map keeps working
//! after its scope is gone.

use fg_core::JobId;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Default)]
pub struct RunCancellations {
    inner: Mutex<HashMap<JobId, CancellationToken>>,
}

impl RunCancellations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a run; the returned guard deregisters on drop.
    pub fn scope(self: &Arc<Self>, root: JobId, token: CancellationToken) -> RunScope {
        self.inner.lock().insert(root.clone(), token);
        RunScope {
            map: Arc::clone(self),
            root,
        }
    }

    /// Cancellation token of the active run owning `root`, if any.
    pub fn find(&self, root: &JobId) -> Option<CancellationToken> {
        self.inner.lock().get(root).cloned()
    }

    pub fn active_count(&self) -> usize {
        self.inner.lock().len()
    }
}

/// Keeps a run registered for its lifetime.
pub struct RunScope {
    map: Arc<RunCancellations>,
    root: JobId,
}

impl Drop for RunScope {
    fn drop(&mut self) {
        self.map.inner.lock().remove(&self.root);
    }
}

#[cfg(test)]
#[path = "cancellations_tests.rs"]
mod tests;
