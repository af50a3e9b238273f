// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker contracts and the context handed to them.
//!
//! Planning and execution are independent capabilities: a
//! [`DefinitionWorker`] plans and launches one step of a definition, a
//! [`JobWorker`] executes one leased queue message. One concrete
//! worker may implement both.

use crate::config::SpawnLimits;
use crate::error::EngineError;
use crate::manager::JobManager;
use crate::EventBus;
use async_trait::async_trait;
use fg_core::{
    Event, InitPlan, JobDefinition, JobId, JobPayload, JobStatus, LogLevel, SharedClock,
    StepDefinition, WorkerError, WorkerKind, WorkerResult, META_RESULT,
};
use fg_storage::Queue;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Instruction to run a (sub-)definition through the orchestrator.
pub struct RunRequest {
    pub definition: JobDefinition,
    /// Drive an already-created manager record instead of creating one
    /// (template workers pre-create sub-manager rows before spawning).
    pub manager_id: Option<JobId>,
    /// Parent for a new manager record, when nested under a step.
    pub parent_id: Option<JobId>,
    pub depth: u32,
}

impl RunRequest {
    pub fn new(definition: JobDefinition) -> Self {
        Self {
            definition,
            manager_id: None,
            parent_id: None,
            depth: 0,
        }
    }

    fg_core::setters! {
        set {
            depth: u32,
        }
        option {
            manager_id: JobId,
            parent_id: JobId,
        }
    }
}

/// Runs job definitions end to end. Implemented by the orchestrator;
/// exists as a trait so planner workers can launch sub-definitions
/// without a circular module dependency.
#[async_trait]
pub trait DefinitionRunner: Send + Sync {
    async fn run(&self, req: RunRequest, cancel: CancellationToken) -> Result<JobId, EngineError>;
}

/// Everything a worker invocation may touch.
///
/// The cancellation token is per-invocation; the rest are shared
/// handles. Workers observe cancellation at their own suspension
/// points via [`WorkerCtx::checkpoint`].
#[derive(Clone)]
pub struct WorkerCtx {
    pub cancel: CancellationToken,
    pub manager: Arc<JobManager>,
    pub queue: Arc<dyn Queue>,
    pub bus: EventBus,
    pub clock: SharedClock,
    pub documents: Arc<dyn fg_core::DocumentStorage>,
    pub kv: Arc<dyn fg_core::KeyValueStorage>,
    pub runner: Option<Arc<dyn DefinitionRunner>>,
    pub limits: SpawnLimits,
}

impl WorkerCtx {
    /// Fork a context with its own child cancellation token.
    pub fn child(&self) -> WorkerCtx {
        let mut ctx = self.clone();
        ctx.cancel = self.cancel.child_token();
        ctx
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Bail out with `Cancelled` if the invocation was cancelled.
    pub fn checkpoint(&self) -> Result<(), WorkerError> {
        if self.cancel.is_cancelled() {
            Err(WorkerError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Emit live step activity for observers.
    pub fn step_progress(
        &self,
        step_id: &JobId,
        activity: impl Into<String>,
        current_url: Option<String>,
        status: impl Into<String>,
    ) {
        self.bus.publish(Event::StepProgress {
            step_id: step_id.clone(),
            activity: activity.into(),
            current_url,
            status: status.into(),
            at_ms: self.clock.epoch_ms(),
        });
    }

    /// Executor entry: transition to running and log the start.
    pub async fn begin_job(&self, payload: &JobPayload) -> Result<(), WorkerError> {
        self.manager
            .update_status(&payload.id, JobStatus::Running)
            .await
            .map_err(engine_to_worker)?;
        self.manager.add_log(
            &payload.id,
            LogLevel::Info,
            format!("{} started: {}", payload.kind, payload.name),
        );
        Ok(())
    }

    /// Executor success: full progress, result metadata, completion log.
    pub async fn complete_job(
        &self,
        payload: &JobPayload,
        total: u64,
        result: &WorkerResult,
    ) -> Result<(), WorkerError> {
        self.manager
            .update_progress(&payload.id, total, total)
            .await
            .map_err(engine_to_worker)?;
        if let Some(value) = result.to_value() {
            let mut patch = fg_core::ConfigMap::new();
            patch.insert(META_RESULT.into(), value);
            self.manager
                .patch_metadata(&payload.id, patch)
                .await
                .map_err(engine_to_worker)?;
        }
        self.manager
            .update_status(&payload.id, JobStatus::Completed)
            .await
            .map_err(engine_to_worker)?;
        self.manager.add_log(
            &payload.id,
            LogLevel::Info,
            format!(
                "{} completed: documents={} errors={}",
                payload.kind,
                result.documents_created,
                result.errors.len()
            ),
        );
        Ok(())
    }

    /// Executor cancellation: mark cancelled (not failed) and log.
    pub async fn cancel_job(&self, payload: &JobPayload) {
        if let Err(e) = self
            .manager
            .update_status(&payload.id, JobStatus::Cancelled)
            .await
        {
            tracing::debug!(job_id = %payload.id, error = %e, "cancel status update skipped");
        }
        self.manager
            .add_log(&payload.id, LogLevel::Warn, "cancelled");
    }

    /// Executor failure: record the error and mark failed. The
    /// dispatcher decides retry vs terminal from the returned error.
    pub async fn fail_job(&self, payload: &JobPayload, error: &WorkerError) {
        if let Err(e) = self.manager.set_error(&payload.id, &error.to_string()).await {
            tracing::debug!(job_id = %payload.id, error = %e, "error message update skipped");
        }
        if let Err(e) = self
            .manager
            .update_status(&payload.id, JobStatus::Failed)
            .await
        {
            tracing::debug!(job_id = %payload.id, error = %e, "failed status update skipped");
        }
        self.manager
            .add_log(&payload.id, LogLevel::Error, error.to_string());
    }
}

/// Illegal transitions are invariant violations; everything else from
/// the manager is a storage blip worth a retry.
fn engine_to_worker(err: EngineError) -> WorkerError {
    match err {
        EngineError::InvalidTransition { .. } => WorkerError::Fatal(err.to_string()),
        EngineError::Cancelled => WorkerError::Cancelled,
        other => WorkerError::TransientIo(other.to_string()),
    }
}

/// Plans one step of a job definition and launches its work.
#[async_trait]
pub trait DefinitionWorker: Send + Sync {
    /// Planner registry key.
    fn kind(&self) -> WorkerKind;

    /// Whether `create_jobs` launches child queue jobs the
    /// orchestrator must wait for.
    fn returns_child_jobs(&self) -> bool {
        false
    }

    /// Pure config validation; no I/O, no records created on failure.
    fn validate_config(&self, step: &StepDefinition) -> Result<(), WorkerError>;

    /// Discovery: produce a complete plan for the step. May perform
    /// I/O (list sources, query documents, resolve keys) but must not
    /// mutate job state.
    async fn init(
        &self,
        ctx: &WorkerCtx,
        step: &StepDefinition,
        definition: &JobDefinition,
    ) -> Result<InitPlan, WorkerError>;

    /// Perform the step: inline work, or persist-then-enqueue child
    /// jobs. Child records must exist before their messages are
    /// visible. Returns the job id the orchestrator watches (the step
    /// id, or an intermediate parent). Must not block on children.
    ///
    /// When `init` is `None` the worker runs its own discovery first.
    async fn create_jobs(
        &self,
        ctx: &WorkerCtx,
        step: &StepDefinition,
        definition: &JobDefinition,
        step_id: &JobId,
        init: Option<InitPlan>,
    ) -> Result<JobId, WorkerError>;
}

/// Executes one leaf queue job.
#[async_trait]
pub trait JobWorker: Send + Sync {
    /// Queue job kind this executor handles.
    fn queue_kind(&self) -> &str;

    /// Pure payload validation (required config/metadata keys).
    fn validate(&self, payload: &JobPayload) -> Result<(), WorkerError>;

    /// Perform the leaf work. Contract:
    /// - transition to running on entry ([`WorkerCtx::begin_job`])
    /// - honour cancellation, marking the job cancelled, not failed
    /// - on success set full progress and completed
    /// - on error record the message, mark failed, and return the
    ///   error so the dispatcher can decide retry vs dead-letter
    /// - redeliveries of the same job id must not corrupt state
    async fn execute(&self, ctx: &WorkerCtx, payload: &JobPayload) -> Result<(), WorkerError>;
}
