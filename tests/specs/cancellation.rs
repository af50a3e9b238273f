// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cooperative cancellation: cancelling a run stops step iteration,
//! marks the current step and manager cancelled, and already-completed
//! children keep their status.

use crate::prelude::*;
use async_trait::async_trait;
use fg_core::{
    InitPlan, JobDefinition, JobId, JobPayload, JobStatus, StepDefinition, WorkItem,
    WorkerError, WorkerKind, WorkerResult,
};
use fg_engine::{spawn_children, DefinitionWorker, JobWorker, WorkerCtx};
use fg_storage::{JobStore, Queue};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Fan-out planner whose leaves finish instantly ("fast") or block
/// until cancelled ("slow").
struct MixedWorker;

#[async_trait]
impl DefinitionWorker for MixedWorker {
    fn kind(&self) -> WorkerKind {
        WorkerKind::new("mixed")
    }

    fn returns_child_jobs(&self) -> bool {
        true
    }

    fn validate_config(&self, _step: &StepDefinition) -> Result<(), WorkerError> {
        Ok(())
    }

    async fn init(
        &self,
        _ctx: &WorkerCtx,
        _step: &StepDefinition,
        _definition: &JobDefinition,
    ) -> Result<InitPlan, WorkerError> {
        Ok(InitPlan::parallel(vec![
            WorkItem::new("fast", "fast leaf", "mixed_leaf"),
            WorkItem::new("slow", "slow leaf", "mixed_leaf"),
        ]))
    }

    async fn create_jobs(
        &self,
        ctx: &WorkerCtx,
        _step: &StepDefinition,
        _definition: &JobDefinition,
        step_id: &JobId,
        init: Option<InitPlan>,
    ) -> Result<JobId, WorkerError> {
        let plan = init.ok_or_else(|| WorkerError::Fatal("expected plan".into()))?;
        spawn_children(ctx, step_id, None, &plan.work_items).await?;
        Ok(step_id.clone())
    }
}

#[async_trait]
impl JobWorker for MixedWorker {
    fn queue_kind(&self) -> &str {
        "mixed_leaf"
    }

    fn validate(&self, _payload: &JobPayload) -> Result<(), WorkerError> {
        Ok(())
    }

    async fn execute(&self, ctx: &WorkerCtx, payload: &JobPayload) -> Result<(), WorkerError> {
        ctx.begin_job(payload).await?;
        if payload.name.starts_with("slow") {
            ctx.cancel.cancelled().await;
            ctx.cancel_job(payload).await;
            return Err(WorkerError::Cancelled);
        }
        ctx.complete_job(payload, 1, &WorkerResult::default()).await
    }
}

#[tokio::test]
async fn cancelling_a_run_cancels_manager_and_current_step() {
    let config = fg_engine::EngineConfig {
        max_attempts: 1,
        ..fast_config()
    };
    let rig = rig(config);
    let worker = Arc::new(MixedWorker);
    rig.engine.registry().register_planner(worker.clone());
    rig.engine.registry().register_executor(worker);

    let def = JobDefinition::new("cancellable")
        .step(StepDefinition::new("fan", "mixed"))
        .step(StepDefinition::new("never-reached", "mixed"));

    let dispatcher = rig.engine.start_dispatcher();
    let cancel = CancellationToken::new();

    // Cancel once the fast leaf has completed.
    let manager = rig.engine.manager().clone();
    let canceller = cancel.clone();
    tokio::spawn(async move {
        loop {
            let done = manager
                .store()
                .list()
                .unwrap_or_default()
                .into_iter()
                .any(|j| j.name == "fast leaf" && j.status == JobStatus::Completed);
            if done {
                canceller.cancel();
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
    });

    let manager_id = rig.engine.run_definition(&def, &cancel).await.unwrap();

    // The cancel must reach the in-flight slow leaf while the
    // dispatcher is still running, not via its shutdown.
    let store = rig.engine.manager().store().clone();
    wait_until(
        || {
            store
                .list()
                .unwrap_or_default()
                .into_iter()
                .any(|j| j.name == "slow leaf" && j.status == JobStatus::Cancelled)
        },
        "slow leaf cancellation",
    )
    .await;
    let queue = rig.queue.clone();
    wait_until(|| queue.in_flight_len() == 0, "slow leaf message retired").await;
    dispatcher.shutdown().await;

    let manager_job = rig.engine.manager().get_job(&manager_id).unwrap();
    assert_eq!(manager_job.status, JobStatus::Cancelled);

    // Only the first step exists and it is cancelled.
    let steps = rig.engine.manager().children(&manager_id).unwrap();
    assert_eq!(steps.len(), 1);
    assert_eq!(steps[0].status, JobStatus::Cancelled);

    // The completed child kept its status; the slow one is cancelled,
    // not failed, and its message retired instead of retrying.
    let leaves = rig.engine.manager().children(&steps[0].id).unwrap();
    let fast = leaves.iter().find(|j| j.name == "fast leaf").unwrap();
    assert_eq!(fast.status, JobStatus::Completed);
    let slow = leaves.iter().find(|j| j.name == "slow leaf").unwrap();
    assert_eq!(slow.status, JobStatus::Cancelled);
    assert_eq!(rig.queue.pending_len(), 0);
    assert!(rig.queue.dead_letters().is_empty());
}
