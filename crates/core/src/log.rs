// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job-correlated log entries.

use crate::job::JobId;
use serde::{Deserialize, Serialize};

/// Severity of a job log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

crate::simple_display! {
    LogLevel {
        Trace => "trace",
        Debug => "debug",
        Info => "info",
        Warn => "warn",
        Error => "error",
    }
}

/// One appended log line, correlated to the run's root manager job.
///
/// Ordering per `job_id` is monotonic in `at_ms` (single writer per id).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobLogEntry {
    pub job_id: JobId,
    pub root_parent_id: JobId,
    pub level: LogLevel,
    pub message: String,
    pub at_ms: u64,
}

#[cfg(test)]
#[path = "log_tests.rs"]
mod tests;
