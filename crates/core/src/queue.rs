// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Queue message and payload types.

use crate::config::ConfigMap;
use crate::job::{Job, JobId};
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

crate::define_id! {
    /// Unique identifier for a queue message.
    ///
    /// Distinct from the job id: a job that is redelivered keeps its id
    /// while the queue tracks the message by this one.
    pub struct MessageId("msg-");
}

/// Metadata key carrying the manager job id logs and events aggregate to.
pub const META_ROOT_PARENT: &str = "root_parent_id";
/// Metadata key for the credential lookup key of external connectors.
pub const META_AUTH_ID: &str = "auth_id";
/// Metadata key preserving the immediate spawner of a flat fan-out child.
pub const META_DISCOVERED_BY: &str = "discovered_by";
/// Metadata key under which a worker's aggregated result is stored.
pub const META_RESULT: &str = "result";

/// Serialized queue form of a job, carried as the message payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobPayload {
    pub id: JobId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<JobId>,
    pub kind: SmolStr,
    pub name: String,
    #[serde(default)]
    pub config: ConfigMap,
    #[serde(default)]
    pub metadata: ConfigMap,
    pub depth: u32,
    pub created_at_ms: u64,
}

impl JobPayload {
    pub fn from_job(job: &Job) -> Self {
        Self {
            id: job.id.clone(),
            parent_id: job.parent_id.clone(),
            kind: job.kind.clone(),
            name: job.name.clone(),
            config: job.config.clone(),
            metadata: job.metadata.clone(),
            depth: job.depth,
            created_at_ms: job.created_at_ms,
        }
    }

    /// Root parent id carried in metadata, when the producer set one.
    pub fn root_parent_id(&self) -> Option<JobId> {
        crate::config::get_str(&self.metadata, META_ROOT_PARENT).map(JobId::from_string)
    }

    pub fn auth_id(&self) -> Option<&str> {
        crate::config::get_str(&self.metadata, META_AUTH_ID)
    }

    pub fn discovered_by(&self) -> Option<JobId> {
        crate::config::get_str(&self.metadata, META_DISCOVERED_BY).map(JobId::from_string)
    }
}

/// A message on the durable queue. Owned by the queue from enqueue
/// until ack or dead-letter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueMessage {
    pub id: MessageId,
    pub job_id: JobId,
    /// Executor lookup key.
    pub kind: SmolStr,
    pub payload: JobPayload,
    /// Epoch ms before which the message is not leased. 0 = immediately.
    #[serde(default)]
    pub visible_after_ms: u64,
    /// Delivery attempts so far (incremented at lease time).
    #[serde(default)]
    pub attempts: u32,
    pub created_at_ms: u64,
}

impl QueueMessage {
    /// Build a message for a leaf job record.
    pub fn for_job(job: &Job, epoch_ms: u64) -> Self {
        Self {
            id: MessageId::generate(),
            job_id: job.id.clone(),
            kind: job.kind.clone(),
            payload: JobPayload::from_job(job),
            visible_after_ms: 0,
            attempts: 0,
            created_at_ms: epoch_ms,
        }
    }
}

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;
