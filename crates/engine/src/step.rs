// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Step manager: run the planner for exactly one step.

use crate::error::EngineError;
use crate::registry::WorkerRegistry;
use crate::worker::WorkerCtx;
use fg_core::{
    JobDefinition, JobId, JobPhase, JobSeed, JobStatus, LogLevel, SpawnStrategy, StepDefinition,
    KIND_STEP,
};
use std::sync::Arc;

/// What a launched step left behind for the orchestrator.
#[derive(Debug)]
pub struct StepLaunch {
    /// Whether child queue jobs exist to wait for.
    pub returns_children: bool,
    /// Job id returned by the planner (the step itself, or an
    /// intermediate parent aggregating children).
    pub wait_root: JobId,
}

pub struct StepManager {
    registry: Arc<WorkerRegistry>,
}

impl StepManager {
    pub fn new(registry: Arc<WorkerRegistry>) -> Self {
        Self { registry }
    }

    /// Run one step: validate, init, create jobs.
    ///
    /// The step record is created if the caller has not already done
    /// so. Config validation fails before any record is touched.
    pub async fn execute(
        &self,
        ctx: &WorkerCtx,
        step: &StepDefinition,
        definition: &JobDefinition,
        manager_id: &JobId,
        step_id: &JobId,
    ) -> Result<StepLaunch, EngineError> {
        let planner = self
            .registry
            .planner(&step.worker)
            .ok_or_else(|| EngineError::UnknownWorker(step.worker.to_string()))?;

        planner.validate_config(step)?;

        if ctx.manager.find_job(step_id)?.is_none() {
            ctx.manager
                .create_job(
                    JobSeed::new(KIND_STEP, step.name.clone())
                        .id(step_id.clone())
                        .parent_id(manager_id.clone())
                        .depth(1)
                        .config(step.config.clone()),
                )
                .await?;
        }
        ctx.manager.update_status(step_id, JobStatus::Running).await?;
        ctx.manager.add_log(
            step_id,
            LogLevel::Info,
            format!("step {} planning with {}", step.name, step.worker),
        );

        let plan = planner.init(ctx, step, definition).await?;
        ctx.checkpoint()?;

        // Nothing discovered: the step is done without ever enqueuing.
        if plan.strategy != SpawnStrategy::Inline && plan.is_empty() {
            ctx.manager.add_log(
                step_id,
                LogLevel::Info,
                format!("step {} found no work items", step.name),
            );
            return Ok(StepLaunch {
                returns_children: false,
                wait_root: step_id.clone(),
            });
        }

        if plan.strategy != SpawnStrategy::Inline {
            ctx.manager
                .update_progress(step_id, 0, plan.total_count as u64)
                .await?;
        }

        let wait_root = planner
            .create_jobs(ctx, step, definition, step_id, Some(plan))
            .await?;

        let returns_children = planner.returns_child_jobs();
        if returns_children {
            ctx.manager.set_phase(step_id, JobPhase::Execution).await?;
        }

        Ok(StepLaunch {
            returns_children,
            wait_root,
        })
    }
}

#[cfg(test)]
#[path = "step_tests.rs"]
mod tests;
