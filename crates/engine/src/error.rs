// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Engine error type.

use fg_core::{JobId, JobStatus, WorkerError};
use fg_storage::{QueueError, StoreError};
use thiserror::Error;

/// Errors surfaced by the job manager, step manager, orchestrator and
/// dispatcher.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Worker(#[from] WorkerError),

    #[error("illegal status transition for {id}: {from} -> {to}")]
    InvalidTransition {
        id: JobId,
        from: JobStatus,
        to: JobStatus,
    },

    #[error("job not found: {0}")]
    JobNotFound(JobId),

    #[error("no planner registered for worker kind {0}")]
    UnknownWorker(String),

    #[error("cancelled")]
    Cancelled,
}

impl EngineError {
    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            Self::Cancelled | Self::Worker(WorkerError::Cancelled)
        )
    }
}
