// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Storage error types.

use fg_core::{JobId, MessageId};
use thiserror::Error;

/// Errors from the job store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("job already exists: {0}")]
    Conflict(JobId),
    #[error("job not found: {0}")]
    NotFound(JobId),
    #[error("storage error: {0}")]
    Io(String),
}

impl StoreError {
    /// Conflicts and missing rows are caller bugs, not blips; only I/O
    /// failures are worth a retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Io(_))
    }
}

/// Errors from the queue.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("message not leased: {0}")]
    NotLeased(MessageId),
    #[error("queue error: {0}")]
    Io(String),
}
