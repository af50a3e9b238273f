// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Leaf timeout: a blocked executor is cancelled cooperatively, the
//! message is redelivered, and attempts exhaust into a dead-lettered
//! failed job.

use crate::prelude::*;
use async_trait::async_trait;
use fg_core::{JobPayload, JobSeed, JobStatus, QueueMessage, WorkerError};
use fg_engine::{JobWorker, WorkerCtx};
use fg_storage::Queue;
use std::sync::Arc;

/// Blocks until its context is cancelled.
struct StuckWorker;

#[async_trait]
impl JobWorker for StuckWorker {
    fn queue_kind(&self) -> &str {
        "stuck"
    }

    fn validate(&self, _payload: &JobPayload) -> Result<(), WorkerError> {
        Ok(())
    }

    async fn execute(&self, ctx: &WorkerCtx, payload: &JobPayload) -> Result<(), WorkerError> {
        ctx.begin_job(payload).await?;
        ctx.cancel.cancelled().await;
        ctx.cancel_job(payload).await;
        Err(WorkerError::Cancelled)
    }
}

#[tokio::test]
async fn timed_out_leaf_retries_then_dead_letters_as_failed() {
    let config = fg_engine::EngineConfig {
        concurrency: 1,
        max_attempts: 3,
        execute_timeout_ms: 30,
        ..fast_config()
    };
    let rig = rig(config);
    rig.engine.registry().register_executor(Arc::new(StuckWorker));

    let job = rig
        .engine
        .manager()
        .create_job(JobSeed::new("stuck", "never finishes"))
        .await
        .unwrap();
    rig.queue
        .enqueue(QueueMessage::for_job(&job, 0))
        .unwrap();

    let dispatcher = rig.engine.start_dispatcher();
    let queue = rig.queue.clone();
    wait_until(|| !queue.dead_letters().is_empty(), "dead letter").await;
    dispatcher.shutdown().await;

    // Final state: failed, with the exhausted-attempts error recorded.
    let record = rig.engine.manager().get_job(&job.id).unwrap();
    assert_eq!(record.status, JobStatus::Failed);
    assert!(record
        .error_message
        .unwrap_or_default()
        .contains("failed after 3 attempts"));

    let dead = rig.queue.dead_letters();
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].attempts, 3);
    assert_eq!(rig.queue.pending_len(), 0);
    assert_eq!(rig.queue.in_flight_len(), 0);
}

#[tokio::test]
async fn expired_lease_redelivers_to_another_slot() {
    // Tight lease so an unacked message comes back without a nack.
    let config = fg_engine::EngineConfig {
        concurrency: 1,
        max_attempts: 5,
        lease_timeout_ms: 20,
        execute_timeout_ms: 5_000,
        ..fast_config()
    };
    let rig = rig(config);

    let job = rig
        .engine
        .manager()
        .create_job(JobSeed::new("stuck", "leased then dropped"))
        .await
        .unwrap();
    rig.queue.enqueue(QueueMessage::for_job(&job, 0)).unwrap();

    // Lease directly (simulating a crashed consumer), then watch the
    // queue hand it out again.
    let first = rig.queue.lease(1).unwrap();
    assert_eq!(first.len(), 1);
    tokio::time::sleep(std::time::Duration::from_millis(30)).await;
    let second = rig.queue.lease(1).unwrap();
    assert_eq!(second.len(), 1);
    assert_eq!(second[0].attempts, 2);
    assert_eq!(second[0].job_id, job.id);
}
