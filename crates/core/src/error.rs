// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker-facing error taxonomy.
//!
//! Workers surface these to the step manager and dispatcher; the
//! dispatcher uses [`WorkerError::is_retryable`] to decide between
//! redelivery and terminal failure. Hitting a spawn limit is not an
//! error and has no variant here — it is reported through
//! `SpawnReport` and logged at debug.

use thiserror::Error;

/// Errors surfaced by planner and executor workers.
#[derive(Debug, Error)]
pub enum WorkerError {
    /// Validation failure before any side effects.
    #[error("invalid config: {field}: {reason}")]
    InvalidConfig { field: String, reason: String },

    /// No planner/executor registered for a type.
    #[error("no worker registered for {0}")]
    UnknownWorker(String),

    /// Network/queue/storage blip; the dispatcher retries these.
    #[error("transient failure: {0}")]
    TransientIo(String),

    /// 4xx-class upstream response or malformed input; never retried.
    #[error("permanent failure: {0}")]
    PermanentIo(String),

    /// Cooperative cancellation was observed.
    #[error("cancelled")]
    Cancelled,

    /// Invariant violation (corrupt state, illegal transition).
    #[error("fatal: {0}")]
    Fatal(String),
}

impl WorkerError {
    pub fn invalid_config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn transient(msg: impl Into<String>) -> Self {
        Self::TransientIo(msg.into())
    }

    pub fn permanent(msg: impl Into<String>) -> Self {
        Self::PermanentIo(msg.into())
    }

    /// True for error classes the dispatcher may redeliver.
    ///
    /// Cancellation is retryable: a timed-out lease goes back on the
    /// queue until attempts are exhausted.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TransientIo(_) | Self::Cancelled)
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
