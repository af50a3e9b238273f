// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared rig for end-to-end scenarios: a full engine over memory
//! storage with fast timeouts.

#![allow(dead_code)]

use fg_core::{SharedClock, SystemClock};
use fg_engine::{Capabilities, Engine, EngineConfig};
use fg_storage::{MemoryJobStore, MemoryQueue};
use fg_workers::{MemoryDocumentStore, MemoryKeyValueStore};
use std::sync::Arc;

pub struct Rig {
    pub engine: Engine,
    pub queue: Arc<MemoryQueue>,
    pub documents: Arc<MemoryDocumentStore>,
    pub kv: Arc<MemoryKeyValueStore>,
}

/// Config tuned so scenarios finish in milliseconds.
pub fn fast_config() -> EngineConfig {
    EngineConfig {
        concurrency: 2,
        lease_batch: 4,
        retry_base_ms: 1,
        retry_cap_ms: 10,
        execute_timeout_ms: 5_000,
        idle_sleep_ms: 5,
        poll_interval_ms: 10,
        step_timeout_ms: 10_000,
        drain_timeout_ms: 500,
        ..Default::default()
    }
}

pub fn rig(config: EngineConfig) -> Rig {
    let clock: SharedClock = Arc::new(SystemClock);
    let queue = Arc::new(MemoryQueue::with_limits(
        clock.clone(),
        config.max_attempts,
        config.lease_timeout_ms,
    ));
    let documents = Arc::new(MemoryDocumentStore::new());
    let kv = Arc::new(MemoryKeyValueStore::new());
    let engine = Engine::new(
        config,
        clock,
        Arc::new(MemoryJobStore::new()),
        queue.clone(),
        Capabilities {
            documents: documents.clone(),
            kv: kv.clone(),
        },
    );
    Rig {
        engine,
        queue,
        documents,
        kv,
    }
}

pub async fn wait_until<F: Fn() -> bool>(cond: F, what: &str) {
    for _ in 0..1_000 {
        if cond() {
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }
    panic!("timed out waiting for {what}");
}
