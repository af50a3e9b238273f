// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job record and status machine.
//!
//! Jobs form a three-level hierarchy: a root manager job (no parent,
//! depth 0), one step job per definition step (parent = manager), and
//! leaf queue jobs underneath steps. For manager and step jobs `depth`
//! is the hierarchy level; for leaf jobs spawned by crawler-class
//! workers it is the spawn-hop distance from the step (first hop = 1),
//! which is what the recursive depth limit applies to.

use crate::config::ConfigMap;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

crate::define_id! {
    /// Unique identifier for a job record.
    ///
    /// Shared by the persistent job row and any queue message that
    /// executes it, so redeliveries land on the same record.
    pub struct JobId("job-");
}

/// Kind tag for the root job of a definition run.
pub const KIND_MANAGER: &str = "manager";
/// Kind tag for per-step jobs under a manager.
pub const KIND_STEP: &str = "step";

/// Lifecycle phase of a job: planning until its worker has produced
/// children (or done its inline work), execution afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobPhase {
    Planning,
    Execution,
}

crate::simple_display! {
    JobPhase {
        Planning => "planning",
        Execution => "execution",
    }
}

/// Job status.
///
/// Transitions: `pending → running → (completed | failed | cancelled)`.
/// Setting the current status again is an idempotent no-op; terminal
/// statuses never revert through the status-update API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

crate::simple_display! {
    JobStatus {
        Pending => "pending",
        Running => "running",
        Completed => "completed",
        Failed => "failed",
        Cancelled => "cancelled",
    }
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Whether the status-update API accepts `self → next`.
    ///
    /// Same-status sets are always accepted (idempotent). A pending job
    /// may move anywhere (a step can be cancelled or failed before it
    /// ever runs); a running job anywhere but back to pending; terminal
    /// statuses accept nothing new.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        if *self == next {
            return true;
        }
        match self {
            Self::Pending => true,
            Self::Running => next != Self::Pending,
            Self::Completed | Self::Failed | Self::Cancelled => false,
        }
    }
}

/// Aggregate status counts for the children of one parent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildStats {
    pub child_count: u64,
    pub completed: u64,
    pub failed: u64,
    pub cancelled: u64,
    pub running: u64,
}

impl ChildStats {
    pub fn terminal(&self) -> u64 {
        self.completed + self.failed + self.cancelled
    }

    /// True once every counted child reached a terminal status.
    /// Vacuously true for zero children.
    pub fn all_terminal(&self) -> bool {
        self.terminal() == self.child_count
    }
}

/// Parameters for creating a new job record.
pub struct JobSeed {
    pub id: JobId,
    pub parent_id: Option<JobId>,
    pub kind: SmolStr,
    pub name: String,
    pub depth: u32,
    pub config: ConfigMap,
    pub metadata: ConfigMap,
    pub payload: Option<serde_json::Value>,
}

impl JobSeed {
    pub fn new(kind: impl Into<SmolStr>, name: impl Into<String>) -> Self {
        Self {
            id: JobId::generate(),
            parent_id: None,
            kind: kind.into(),
            name: name.into(),
            depth: 0,
            config: ConfigMap::new(),
            metadata: ConfigMap::new(),
            payload: None,
        }
    }

    crate::setters! {
        into {
            id: JobId,
        }
        set {
            depth: u32,
            config: ConfigMap,
            metadata: ConfigMap,
        }
        option {
            parent_id: JobId,
            payload: serde_json::Value,
        }
    }
}

/// A persistent job record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<JobId>,
    /// Free-form kind tag (`manager`, `step`, `crawl_page`, …).
    pub kind: SmolStr,
    pub name: String,
    pub phase: JobPhase,
    pub status: JobStatus,
    pub depth: u32,
    #[serde(default)]
    pub progress_current: u64,
    #[serde(default)]
    pub progress_total: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Engine- and worker-maintained state (root parent id, results, …).
    #[serde(default)]
    pub metadata: ConfigMap,
    /// The worker's input.
    #[serde(default)]
    pub config: ConfigMap,
    /// Serialized queue form, present on leaf queue jobs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
    pub created_at_ms: u64,
    pub updated_at_ms: u64,
    #[serde(default)]
    pub last_log_at_ms: u64,
}

impl Job {
    /// Materialize a pending record from a seed.
    pub fn new(seed: JobSeed, epoch_ms: u64) -> Self {
        Self {
            id: seed.id,
            parent_id: seed.parent_id,
            kind: seed.kind,
            name: seed.name,
            phase: JobPhase::Planning,
            status: JobStatus::Pending,
            depth: seed.depth,
            progress_current: 0,
            progress_total: 0,
            error_message: None,
            metadata: seed.metadata,
            config: seed.config,
            payload: seed.payload,
            created_at_ms: epoch_ms,
            updated_at_ms: epoch_ms,
            last_log_at_ms: 0,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

crate::builder! {
    pub struct JobBuilder => Job {
        into {
            id: JobId = JobId::from_string("job-test-1"),
            kind: SmolStr = "step",
            name: String = "test-job",
        }
        set {
            phase: JobPhase = JobPhase::Planning,
            status: JobStatus = JobStatus::Pending,
            depth: u32 = 1,
            progress_current: u64 = 0,
            progress_total: u64 = 0,
            metadata: ConfigMap = ConfigMap::new(),
            config: ConfigMap = ConfigMap::new(),
            created_at_ms: u64 = 1_000_000,
            updated_at_ms: u64 = 1_000_000,
            last_log_at_ms: u64 = 0,
        }
        option {
            parent_id: JobId = None,
            error_message: String = None,
            payload: serde_json::Value = None,
        }
    }
}

#[cfg(test)]
#[path = "job_tests.rs"]
mod tests;
