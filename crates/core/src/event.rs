// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Observer events.
//!
//! Serializes with `{"type": "job:spawn", ...fields}` format. Events
//! are fire-and-forget UI fodder: observers may be absent and must
//! tolerate drops and duplicates. Nothing on the correctness path
//! reads them. Unknown type tags deserialize to `Custom`.

use crate::job::JobId;
use crate::log::LogLevel;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    /// A child job record was created under a parent.
    #[serde(rename = "job:spawn")]
    JobSpawn {
        parent_job_id: JobId,
        child_job_id: JobId,
        job_kind: SmolStr,
        name: String,
        at_ms: u64,
    },

    /// A worker persisted a document.
    #[serde(rename = "document:saved")]
    DocumentSaved {
        job_id: JobId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        parent_job_id: Option<JobId>,
        document_id: String,
        title: String,
        at_ms: u64,
    },

    /// Live activity for a step (crawl progress, current url, …).
    #[serde(rename = "step:progress")]
    StepProgress {
        step_id: JobId,
        activity: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        current_url: Option<String>,
        status: String,
        at_ms: u64,
    },

    /// A job-correlated log line, tagged with its root manager id.
    #[serde(rename = "job:log")]
    JobLog {
        job_id: JobId,
        root_parent_id: JobId,
        level: LogLevel,
        message: String,
        at_ms: u64,
    },

    /// Catch-all for unknown event types (extensibility)
    #[serde(other, skip_serializing)]
    Custom,
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
