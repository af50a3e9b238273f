// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Orchestrator: drives one job definition end to end.
//!
//! Creates the manager job, runs steps in order through the step
//! manager, waits for child-producing steps by polling child stats,
//! applies each step's error policy, and rolls the outcome up to the
//! manager record. Cancellation is cooperative: the current step and
//! the manager are marked cancelled and in-flight leaves finish on
//! their own cancellation checks.

use crate::bus::EventBus;
use crate::cancellations::RunCancellations;
use crate::config::{EngineConfig, SpawnLimits};
use crate::error::EngineError;
use crate::manager::JobManager;
use crate::registry::WorkerRegistry;
use crate::step::StepManager;
use crate::worker::{DefinitionRunner, RunRequest, WorkerCtx};
use async_trait::async_trait;
use fg_core::{
    ChildStats, DocumentStorage, Job, JobDefinition, JobId, JobSeed, JobStatus, KeyValueStorage,
    LogLevel, SharedClock, StepDefinition, WorkerError, WorkerResult, KIND_MANAGER, KIND_STEP,
    META_RESULT, OnError,
};
use fg_storage::Queue;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Terminal outcome of one step.
enum StepOutcome {
    Completed,
    Failed(String),
    Cancelled,
}

pub struct Orchestrator {
    manager: Arc<JobManager>,
    queue: Arc<dyn Queue>,
    step_manager: StepManager,
    bus: EventBus,
    clock: SharedClock,
    config: EngineConfig,
    documents: Arc<dyn DocumentStorage>,
    kv: Arc<dyn KeyValueStorage>,
    run_cancels: Arc<RunCancellations>,
    self_ref: Weak<Orchestrator>,
}

impl Orchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        manager: Arc<JobManager>,
        queue: Arc<dyn Queue>,
        registry: Arc<WorkerRegistry>,
        bus: EventBus,
        clock: SharedClock,
        config: EngineConfig,
        documents: Arc<dyn DocumentStorage>,
        kv: Arc<dyn KeyValueStorage>,
        run_cancels: Arc<RunCancellations>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|self_ref| Self {
            manager,
            queue,
            step_manager: StepManager::new(registry),
            bus,
            clock,
            config,
            documents,
            kv,
            run_cancels,
            self_ref: self_ref.clone(),
        })
    }

    fn worker_ctx(&self, cancel: CancellationToken) -> WorkerCtx {
        WorkerCtx {
            cancel,
            manager: self.manager.clone(),
            queue: self.queue.clone(),
            bus: self.bus.clone(),
            clock: self.clock.clone(),
            documents: self.documents.clone(),
            kv: self.kv.clone(),
            runner: self
                .self_ref
                .upgrade()
                .map(|arc| arc as Arc<dyn DefinitionRunner>),
            limits: SpawnLimits::from(&self.config),
        }
    }

    /// Run a definition as a fresh root manager job.
    pub async fn run_definition(
        &self,
        definition: &JobDefinition,
        cancel: &CancellationToken,
    ) -> Result<JobId, EngineError> {
        self.run_request(RunRequest::new(definition.clone()), cancel.clone())
            .await
    }

    async fn run_request(
        &self,
        req: RunRequest,
        cancel: CancellationToken,
    ) -> Result<JobId, EngineError> {
        let definition = req.definition;
        let manager_job = self.ensure_manager_job(&req.manager_id, &req.parent_id, req.depth, &definition).await?;
        let manager_id = manager_job.id.clone();

        // Visible to the dispatcher for the run's lifetime: cancelling
        // this token also cancels the run's in-flight leaf contexts.
        let _scope = self.run_cancels.scope(manager_id.clone(), cancel.clone());

        self.manager
            .update_status(&manager_id, JobStatus::Running)
            .await?;
        self.manager
            .update_progress(&manager_id, 0, definition.steps.len() as u64)
            .await?;
        self.manager.add_log(
            &manager_id,
            LogLevel::Info,
            format!(
                "run started: {} ({} steps)",
                definition.name,
                definition.steps.len()
            ),
        );

        let mut failed_steps: Vec<String> = Vec::new();
        for (index, step) in definition.steps.iter().enumerate() {
            if cancel.is_cancelled() {
                return self.finish_cancelled(&manager_id).await;
            }

            let step_id = JobId::generate();
            let ctx = self.worker_ctx(cancel.child_token());
            let outcome = self
                .run_step(&ctx, step, &definition, &manager_id, &step_id, &cancel)
                .await?;

            match outcome {
                StepOutcome::Completed => {
                    self.manager.add_log(
                        &manager_id,
                        LogLevel::Info,
                        format!("step {} completed", step.name),
                    );
                }
                StepOutcome::Cancelled => {
                    return self.finish_cancelled(&manager_id).await;
                }
                StepOutcome::Failed(reason) => {
                    failed_steps.push(step.name.clone());
                    match step.on_error {
                        OnError::Abort => {
                            self.manager.set_error(&manager_id, &reason).await?;
                            self.manager
                                .update_status(&manager_id, JobStatus::Failed)
                                .await?;
                            self.manager.add_log(
                                &manager_id,
                                LogLevel::Error,
                                format!("step {} failed, aborting run: {reason}", step.name),
                            );
                            return Ok(manager_id);
                        }
                        OnError::Continue => {
                            self.manager.add_log(
                                &manager_id,
                                LogLevel::Warn,
                                format!("step {} failed, continuing: {reason}", step.name),
                            );
                        }
                    }
                }
            }
            self.manager
                .update_progress(&manager_id, (index + 1) as u64, definition.steps.len() as u64)
                .await?;
        }

        if failed_steps.is_empty() {
            self.manager
                .update_status(&manager_id, JobStatus::Completed)
                .await?;
            self.manager
                .add_log(&manager_id, LogLevel::Info, "run completed");
        } else {
            // Every failure was under on_error = continue: completed
            // with warnings.
            let mut patch = fg_core::ConfigMap::new();
            patch.insert(
                "warnings".into(),
                serde_json::Value::from(failed_steps.clone()),
            );
            self.manager.patch_metadata(&manager_id, patch).await?;
            self.manager
                .update_status(&manager_id, JobStatus::Completed)
                .await?;
            self.manager.add_log(
                &manager_id,
                LogLevel::Warn,
                format!("run completed with {} failed steps", failed_steps.len()),
            );
        }
        Ok(manager_id)
    }

    async fn ensure_manager_job(
        &self,
        manager_id: &Option<JobId>,
        parent_id: &Option<JobId>,
        depth: u32,
        definition: &JobDefinition,
    ) -> Result<Job, EngineError> {
        if let Some(id) = manager_id {
            if let Some(job) = self.manager.find_job(id)? {
                return Ok(job);
            }
        }
        let mut seed = JobSeed::new(KIND_MANAGER, definition.name.clone())
            .depth(depth)
            .config(definition.config.clone());
        if let Some(id) = manager_id {
            seed = seed.id(id.clone());
        }
        if let Some(parent) = parent_id {
            seed = seed.parent_id(parent.clone());
        }
        self.manager.create_job(seed).await
    }

    async fn finish_cancelled(&self, manager_id: &JobId) -> Result<JobId, EngineError> {
        if let Err(e) = self
            .manager
            .update_status(manager_id, JobStatus::Cancelled)
            .await
        {
            tracing::debug!(job_id = %manager_id, error = %e, "manager cancel skipped");
        }
        self.manager
            .add_log(manager_id, LogLevel::Warn, "run cancelled");
        Ok(manager_id.clone())
    }

    async fn run_step(
        &self,
        ctx: &WorkerCtx,
        step: &StepDefinition,
        definition: &JobDefinition,
        manager_id: &JobId,
        step_id: &JobId,
        cancel: &CancellationToken,
    ) -> Result<StepOutcome, EngineError> {
        let launch = match self
            .step_manager
            .execute(ctx, step, definition, manager_id, step_id)
            .await
        {
            Ok(launch) => launch,
            Err(err) if err.is_cancelled() => {
                self.mark_step_cancelled(step_id).await;
                return Ok(StepOutcome::Cancelled);
            }
            Err(EngineError::Worker(WorkerError::InvalidConfig { field, reason })) => {
                // Validation failed before any record: surface through
                // the policy without touching job state.
                return Ok(StepOutcome::Failed(format!(
                    "invalid config: {field}: {reason}"
                )));
            }
            Err(EngineError::UnknownWorker(kind)) => {
                let reason = format!("no planner registered for worker kind {kind}");
                self.mark_step_failed(ctx, step, manager_id, step_id, &reason)
                    .await?;
                return Ok(StepOutcome::Failed(reason));
            }
            Err(EngineError::Worker(err)) => {
                let reason = err.to_string();
                self.mark_step_failed(ctx, step, manager_id, step_id, &reason)
                    .await?;
                return Ok(StepOutcome::Failed(reason));
            }
            Err(other) => return Err(other),
        };

        if !launch.returns_children {
            self.manager.update_progress(step_id, 1, 1).await?;
            self.manager
                .update_status(step_id, JobStatus::Completed)
                .await?;
            return Ok(StepOutcome::Completed);
        }

        let outcome = self.wait_for_children(ctx, step_id, cancel).await?;
        match &outcome {
            StepOutcome::Completed => {
                self.aggregate_child_results(step_id).await?;
                self.manager
                    .update_status(step_id, JobStatus::Completed)
                    .await?;
            }
            StepOutcome::Failed(reason) => {
                self.aggregate_child_results(step_id).await?;
                self.manager.set_error(step_id, reason).await?;
                self.manager
                    .update_status(step_id, JobStatus::Failed)
                    .await?;
            }
            StepOutcome::Cancelled => {
                self.mark_step_cancelled(step_id).await;
            }
        }
        Ok(outcome)
    }

    async fn mark_step_cancelled(&self, step_id: &JobId) {
        if self
            .manager
            .find_job(step_id)
            .ok()
            .flatten()
            .is_none()
        {
            return;
        }
        if let Err(e) = self
            .manager
            .update_status(step_id, JobStatus::Cancelled)
            .await
        {
            tracing::debug!(job_id = %step_id, error = %e, "step cancel skipped");
        }
    }

    async fn mark_step_failed(
        &self,
        ctx: &WorkerCtx,
        step: &StepDefinition,
        manager_id: &JobId,
        step_id: &JobId,
        reason: &str,
    ) -> Result<(), EngineError> {
        if self.manager.find_job(step_id)?.is_none() {
            self.manager
                .create_job(
                    JobSeed::new(KIND_STEP, step.name.clone())
                        .id(step_id.clone())
                        .parent_id(manager_id.clone())
                        .depth(1)
                        .config(step.config.clone()),
                )
                .await?;
        }
        self.manager.set_error(step_id, reason).await?;
        self.manager
            .update_status(step_id, JobStatus::Failed)
            .await?;
        ctx.step_progress(step_id, "failed", None, "failed");
        Ok(())
    }

    /// Poll until every descendant of the step is terminal, the step
    /// times out, or the run is cancelled.
    async fn wait_for_children(
        &self,
        ctx: &WorkerCtx,
        step_id: &JobId,
        cancel: &CancellationToken,
    ) -> Result<StepOutcome, EngineError> {
        let poll = Duration::from_millis(self.config.poll_interval_ms.max(1));
        let deadline = tokio::time::Instant::now()
            + Duration::from_millis(self.config.step_timeout_ms);

        loop {
            let stats = self.settle_descendants(step_id).await?;
            if stats.all_terminal() {
                self.manager
                    .update_progress(step_id, stats.terminal(), stats.child_count)
                    .await?;
                if stats.failed > 0 {
                    return Ok(StepOutcome::Failed(format!(
                        "{} of {} children failed",
                        stats.failed, stats.child_count
                    )));
                }
                return Ok(StepOutcome::Completed);
            }

            self.manager
                .update_progress(step_id, stats.terminal(), stats.child_count)
                .await?;
            ctx.step_progress(
                step_id,
                format!("{}/{} children done", stats.terminal(), stats.child_count),
                None,
                "running",
            );

            if tokio::time::Instant::now() >= deadline {
                return Ok(StepOutcome::Failed(format!(
                    "step timed out after {} ms",
                    self.config.step_timeout_ms
                )));
            }
            tokio::select! {
                _ = cancel.cancelled() => return Ok(StepOutcome::Cancelled),
                _ = tokio::time::sleep(poll) => {}
            }
        }
    }

    /// Direct-child stats for a step, after completing any
    /// intermediate parent whose own subtree has settled.
    ///
    /// Sub-definition managers are excluded: their orchestrator run
    /// marks them terminal itself.
    async fn settle_descendants(&self, step_id: &JobId) -> Result<ChildStats, EngineError> {
        let children = self.manager.children(step_id)?;
        for child in &children {
            if child.is_terminal() || child.kind == KIND_MANAGER {
                continue;
            }
            let descendants = self.collect_descendants(&child.id)?;
            if descendants.is_empty() {
                continue;
            }
            if descendants.iter().all(Job::is_terminal) {
                let failed = descendants
                    .iter()
                    .filter(|j| j.status == JobStatus::Failed)
                    .count();
                if failed > 0 {
                    self.manager
                        .set_error(&child.id, &format!("{failed} children failed"))
                        .await?;
                    self.manager
                        .update_status(&child.id, JobStatus::Failed)
                        .await?;
                } else {
                    self.manager
                        .update_status(&child.id, JobStatus::Completed)
                        .await?;
                }
            }
        }
        let stats = self
            .manager
            .child_stats(std::slice::from_ref(step_id))?
            .remove(step_id)
            .unwrap_or_default();
        Ok(stats)
    }

    fn collect_descendants(&self, root: &JobId) -> Result<Vec<Job>, EngineError> {
        let mut out = Vec::new();
        let mut stack = vec![root.clone()];
        while let Some(id) = stack.pop() {
            for child in self.manager.children(&id)? {
                stack.push(child.id.clone());
                out.push(child);
            }
        }
        Ok(out)
    }

    /// Fold child worker results into the step's metadata, on top of
    /// whatever the planner already recorded (e.g. seed documents).
    async fn aggregate_child_results(&self, step_id: &JobId) -> Result<(), EngineError> {
        let children = self.manager.children(step_id)?;
        let mut step_result = self
            .manager
            .get_job(step_id)?
            .metadata
            .get(META_RESULT)
            .and_then(WorkerResult::from_value)
            .unwrap_or_default();
        let mut found = false;
        for child in children {
            if let Some(value) = child.metadata.get(META_RESULT) {
                if let Some(result) = WorkerResult::from_value(value) {
                    step_result.merge_keyed(child.name.clone(), result);
                    found = true;
                }
            }
        }
        if found {
            let mut patch = fg_core::ConfigMap::new();
            if let Some(value) = step_result.to_value() {
                patch.insert(META_RESULT.into(), value);
                self.manager.patch_metadata(step_id, patch).await?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl DefinitionRunner for Orchestrator {
    async fn run(&self, req: RunRequest, cancel: CancellationToken) -> Result<JobId, EngineError> {
        self.run_request(req, cancel).await
    }
}

#[cfg(test)]
#[path = "orchestrator_tests.rs"]
mod tests;
