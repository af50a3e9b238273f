// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job manager: single source of truth for job state.
//!
//! All mutations flow through here and serialize under the store lock,
//! which gives single-writer semantics per job id. Storage blips on
//! the write path are retried with backoff; log appends degrade to
//! event-only delivery rather than failing the caller.

use crate::bus::EventBus;
use crate::error::EngineError;
use fg_core::{
    config, ChildStats, Event, Job, JobId, JobLogEntry, JobPhase, JobSeed, JobStatus, LogLevel,
    SharedClock, META_ROOT_PARENT,
};
use fg_storage::{JobStore, LogBuffer, StoreError};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Write retries for transient storage errors.
const STORE_RETRIES: u32 = 3;
const STORE_RETRY_BASE_MS: u64 = 50;

/// Guard against corrupt parent chains.
const MAX_CHAIN_WALK: u32 = 64;

pub struct JobManager {
    store: Arc<dyn JobStore>,
    logs: LogBuffer,
    bus: EventBus,
    clock: SharedClock,
    /// job id → root manager id, filled on first log append.
    root_cache: Mutex<HashMap<JobId, JobId>>,
}

impl JobManager {
    pub fn new(
        store: Arc<dyn JobStore>,
        bus: EventBus,
        clock: SharedClock,
        log_capacity: usize,
    ) -> Self {
        Self {
            store,
            logs: LogBuffer::new(log_capacity),
            bus,
            clock,
            root_cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &Arc<dyn JobStore> {
        &self.store
    }

    pub fn logs(&self) -> &LogBuffer {
        &self.logs
    }

    async fn with_retry<T>(
        &self,
        what: &str,
        mut op: impl FnMut() -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut delay_ms = STORE_RETRY_BASE_MS;
        let mut attempt = 0u32;
        loop {
            match op() {
                Ok(v) => return Ok(v),
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) => {
                    attempt += 1;
                    if attempt >= STORE_RETRIES {
                        tracing::error!(what, error = %e, attempt, "storage write failed, giving up");
                        return Err(e);
                    }
                    tracing::warn!(what, error = %e, attempt, "storage write failed, retrying");
                    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                    delay_ms *= 2;
                }
            }
        }
    }

    /// Create a pending job record. Fails with `Conflict` on a
    /// duplicate id. Publishes `job:spawn` when the record has a
    /// parent.
    pub async fn create_job(&self, seed: JobSeed) -> Result<Job, EngineError> {
        let job = Job::new(seed, self.clock.epoch_ms());
        self.with_retry("create_job", || self.store.insert(job.clone()))
            .await?;
        if let Some(parent) = &job.parent_id {
            self.bus.publish(Event::JobSpawn {
                parent_job_id: parent.clone(),
                child_job_id: job.id.clone(),
                job_kind: job.kind.clone(),
                name: job.name.clone(),
                at_ms: job.created_at_ms,
            });
        }
        Ok(job)
    }

    pub fn get_job(&self, id: &JobId) -> Result<Job, EngineError> {
        self.store
            .get(id)?
            .ok_or_else(|| EngineError::JobNotFound(id.clone()))
    }

    pub fn find_job(&self, id: &JobId) -> Result<Option<Job>, EngineError> {
        Ok(self.store.get(id)?)
    }

    /// Set a job's status, enforcing the status machine. Setting the
    /// current status again is an idempotent no-op; terminal statuses
    /// reject every change with `InvalidTransition`.
    pub async fn update_status(
        &self,
        id: &JobId,
        status: JobStatus,
    ) -> Result<Job, EngineError> {
        let now_ms = self.clock.epoch_ms();
        let mut violation: Option<JobStatus> = None;
        let job = self
            .with_retry("update_status", || {
                self.store.update(id, &mut |job| {
                    if job.status == status {
                        return;
                    }
                    if !job.status.can_transition_to(status) {
                        violation = Some(job.status);
                        return;
                    }
                    job.status = status;
                    job.updated_at_ms = now_ms;
                })
            })
            .await?;
        if let Some(from) = violation {
            return Err(EngineError::InvalidTransition {
                id: id.clone(),
                from,
                to: status,
            });
        }
        Ok(job)
    }

    /// Store an error message. The caller still decides the status.
    pub async fn set_error(&self, id: &JobId, message: &str) -> Result<Job, EngineError> {
        let now_ms = self.clock.epoch_ms();
        let job = self
            .with_retry("set_error", || {
                self.store.update(id, &mut |job| {
                    job.error_message = Some(message.to_string());
                    job.updated_at_ms = now_ms;
                })
            })
            .await?;
        Ok(job)
    }

    /// Move a job between planning and execution.
    pub async fn set_phase(&self, id: &JobId, phase: JobPhase) -> Result<Job, EngineError> {
        let now_ms = self.clock.epoch_ms();
        Ok(self
            .with_retry("set_phase", || {
                self.store.update(id, &mut |job| {
                    job.phase = phase;
                    job.updated_at_ms = now_ms;
                })
            })
            .await?)
    }

    /// Update progress counters.
    ///
    /// `current` is monotonic while `total` is unchanged and clamps to
    /// `total` once a total is known.
    pub async fn update_progress(
        &self,
        id: &JobId,
        current: u64,
        total: u64,
    ) -> Result<Job, EngineError> {
        let now_ms = self.clock.epoch_ms();
        Ok(self
            .with_retry("update_progress", || {
                self.store.update(id, &mut |job| {
                    let mut next = if total == job.progress_total {
                        job.progress_current.max(current)
                    } else {
                        job.progress_total = total;
                        current
                    };
                    if total > 0 {
                        next = next.min(total);
                    }
                    job.progress_current = next;
                    job.updated_at_ms = now_ms;
                })
            })
            .await?)
    }

    /// Shallow-merge a metadata patch; `null` values delete keys.
    pub async fn patch_metadata(
        &self,
        id: &JobId,
        patch: fg_core::ConfigMap,
    ) -> Result<Job, EngineError> {
        let now_ms = self.clock.epoch_ms();
        Ok(self
            .with_retry("patch_metadata", || {
                self.store.update(id, &mut |job| {
                    config::merge_patch(&mut job.metadata, patch.clone());
                    job.updated_at_ms = now_ms;
                })
            })
            .await?)
    }

    /// Append a job-correlated log line.
    ///
    /// The root manager id is resolved from `metadata.root_parent_id`
    /// when present, otherwise by walking the parent chain once and
    /// caching the answer. Storage trouble downgrades to event-only
    /// delivery; the caller never fails because of a log line.
    pub fn add_log(&self, id: &JobId, level: LogLevel, message: impl Into<String>) {
        let message = message.into();
        let at_ms = self.clock.epoch_ms();
        let root = self.resolve_root(id);

        let updated = self.store.update(id, &mut |job| {
            job.last_log_at_ms = at_ms;
        });
        if let Err(e) = updated {
            tracing::debug!(job_id = %id, error = %e, "log timestamp update skipped");
        }

        let entry = JobLogEntry {
            job_id: id.clone(),
            root_parent_id: root.clone(),
            level,
            message: message.clone(),
            at_ms,
        };
        self.logs.append(entry);
        self.bus.publish(Event::JobLog {
            job_id: id.clone(),
            root_parent_id: root,
            level,
            message,
            at_ms,
        });
    }

    /// Root manager id for a job, cached after the first walk.
    pub fn resolve_root(&self, id: &JobId) -> JobId {
        if let Some(root) = self.root_cache.lock().get(id) {
            return root.clone();
        }
        let mut current = id.clone();
        let mut hops = 0u32;
        let root = loop {
            match self.store.get(&current) {
                Ok(Some(job)) => {
                    if let Some(tagged) = config::get_str(&job.metadata, META_ROOT_PARENT) {
                        break JobId::from_string(tagged);
                    }
                    match job.parent_id {
                        Some(parent) => current = parent,
                        None => break current,
                    }
                }
                // Unknown job: correlate to itself rather than drop the line.
                _ => break current,
            }
            hops += 1;
            if hops > MAX_CHAIN_WALK {
                tracing::error!(job_id = %id, "parent chain too deep, truncating root resolution");
                break current;
            }
        };
        self.root_cache.lock().insert(id.clone(), root.clone());
        root
    }

    pub fn children(&self, parent_id: &JobId) -> Result<Vec<Job>, EngineError> {
        Ok(self.store.children(parent_id)?)
    }

    pub fn child_stats(
        &self,
        parent_ids: &[JobId],
    ) -> Result<HashMap<JobId, ChildStats>, EngineError> {
        Ok(self.store.child_stats(parent_ids)?)
    }

    /// Re-arm a job for queue redelivery.
    ///
    /// The public status machine never leaves a terminal status; a
    /// redelivered message is a fresh execution attempt of the same
    /// job id, so this privileged reset is the one sanctioned way back
    /// to pending.
    pub async fn reset_for_redelivery(
        &self,
        id: &JobId,
        attempt: u32,
    ) -> Result<Job, EngineError> {
        let now_ms = self.clock.epoch_ms();
        let job = self
            .with_retry("reset_for_redelivery", || {
                self.store.update(id, &mut |job| {
                    job.status = JobStatus::Pending;
                    job.updated_at_ms = now_ms;
                })
            })
            .await?;
        self.add_log(
            id,
            LogLevel::Debug,
            format!("redelivery attempt {attempt}"),
        );
        Ok(job)
    }

    /// Terminal failure for dead-lettered jobs, regardless of the
    /// status the executor left behind (a timed-out attempt leaves
    /// `cancelled`). Completed jobs are left untouched.
    pub async fn force_fail(&self, id: &JobId, message: &str) -> Result<Job, EngineError> {
        let now_ms = self.clock.epoch_ms();
        let mut skipped = false;
        let job = self
            .with_retry("force_fail", || {
                self.store.update(id, &mut |job| {
                    if job.status == JobStatus::Completed {
                        skipped = true;
                        return;
                    }
                    job.status = JobStatus::Failed;
                    job.error_message = Some(message.to_string());
                    job.updated_at_ms = now_ms;
                })
            })
            .await?;
        if skipped {
            tracing::warn!(job_id = %id, "force_fail skipped: job already completed");
        } else {
            self.add_log(id, LogLevel::Error, message.to_string());
        }
        Ok(job)
    }
}

#[cfg(test)]
#[path = "manager_tests.rs"]
mod tests;
