// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared fixtures for worker unit tests.

use crate::{MemoryDocumentStore, MemoryKeyValueStore};
use fg_core::{FakeClock, JobId, JobSeed, SharedClock, KIND_MANAGER, KIND_STEP};
use fg_engine::{EngineConfig, EventBus, JobManager, SpawnLimits, WorkerCtx};
use fg_storage::{MemoryJobStore, MemoryQueue};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub struct Harness {
    pub clock: FakeClock,
    pub bus: EventBus,
    pub manager: Arc<JobManager>,
    pub queue: Arc<MemoryQueue>,
    pub documents: Arc<MemoryDocumentStore>,
    pub kv: Arc<MemoryKeyValueStore>,
    pub ctx: WorkerCtx,
}

pub fn harness() -> Harness {
    harness_with_limits(SpawnLimits::from(&EngineConfig::default()))
}

pub fn harness_with_limits(limits: SpawnLimits) -> Harness {
    let clock = FakeClock::new();
    let shared: SharedClock = Arc::new(clock.clone());
    let bus = EventBus::default();
    let manager = Arc::new(JobManager::new(
        Arc::new(MemoryJobStore::new()),
        bus.clone(),
        shared.clone(),
        100,
    ));
    let queue = Arc::new(MemoryQueue::new(shared.clone()));
    let documents = Arc::new(MemoryDocumentStore::new());
    let kv = Arc::new(MemoryKeyValueStore::new());
    let ctx = WorkerCtx {
        cancel: CancellationToken::new(),
        manager: manager.clone(),
        queue: queue.clone(),
        bus: bus.clone(),
        clock: shared,
        documents: documents.clone(),
        kv: kv.clone(),
        runner: None,
        limits,
    };
    Harness {
        clock,
        bus,
        manager,
        queue,
        documents,
        kv,
        ctx,
    }
}

/// Manager + step records, returning both ids.
pub async fn seed_step(h: &Harness, step_name: &str) -> (JobId, JobId) {
    let mgr = h
        .manager
        .create_job(JobSeed::new(KIND_MANAGER, "test-run"))
        .await
        .expect("create manager");
    let step = h
        .manager
        .create_job(
            JobSeed::new(KIND_STEP, step_name)
                .parent_id(mgr.id.clone())
                .depth(1),
        )
        .await
        .expect("create step");
    (mgr.id, step.id)
}
