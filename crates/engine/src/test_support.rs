// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared fixtures for engine unit tests.

use crate::bus::EventBus;
use crate::config::{EngineConfig, SpawnLimits};
use crate::manager::JobManager;
use crate::worker::WorkerCtx;
use async_trait::async_trait;
use fg_core::{CapabilityError, ConfigMap, Document, DocumentStorage, FakeClock, KeyValueStorage};
use fg_storage::{MemoryJobStore, MemoryQueue};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Document store stub for tests that never touch documents.
pub struct NullDocumentStore;

#[async_trait]
impl DocumentStorage for NullDocumentStore {
    async fn save(&self, _doc: Document) -> Result<String, CapabilityError> {
        Err(CapabilityError::Unavailable("null document store".into()))
    }

    async fn get(&self, _id: &str) -> Result<Option<Document>, CapabilityError> {
        Ok(None)
    }

    async fn update_metadata(&self, _id: &str, _patch: ConfigMap) -> Result<(), CapabilityError> {
        Err(CapabilityError::Unavailable("null document store".into()))
    }

    async fn search_tags(&self, _tags: &[String]) -> Result<Vec<Document>, CapabilityError> {
        Ok(Vec::new())
    }
}

/// Key-value store stub.
pub struct NullKeyValueStore;

#[async_trait]
impl KeyValueStorage for NullKeyValueStore {
    async fn get(&self, _key: &str) -> Result<Option<String>, CapabilityError> {
        Ok(None)
    }

    async fn set(&self, _key: &str, _value: String) -> Result<(), CapabilityError> {
        Ok(())
    }

    async fn delete(&self, _key: &str) -> Result<(), CapabilityError> {
        Ok(())
    }
}

pub struct Harness {
    pub clock: FakeClock,
    pub bus: EventBus,
    pub manager: Arc<JobManager>,
    pub queue: Arc<MemoryQueue>,
    pub ctx: WorkerCtx,
}

/// Engine wiring over memory stores with the given spawn limits.
pub fn harness_with_limits(limits: SpawnLimits) -> Harness {
    let clock = FakeClock::new();
    let shared = Arc::new(clock.clone());
    let bus = EventBus::default();
    let manager = Arc::new(JobManager::new(
        Arc::new(MemoryJobStore::new()),
        bus.clone(),
        shared.clone(),
        100,
    ));
    let queue = Arc::new(MemoryQueue::new(shared.clone()));
    let ctx = WorkerCtx {
        cancel: CancellationToken::new(),
        manager: manager.clone(),
        queue: queue.clone(),
        bus: bus.clone(),
        clock: shared,
        documents: Arc::new(NullDocumentStore),
        kv: Arc::new(NullKeyValueStore),
        runner: None,
        limits,
    };
    Harness {
        clock,
        bus,
        manager,
        queue,
        ctx,
    }
}

pub fn harness() -> Harness {
    harness_with_limits(SpawnLimits::from(&EngineConfig::default()))
}
