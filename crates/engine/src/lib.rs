// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! fg-engine: orchestration and execution runtime.
//!
//! Wires the job manager, worker registry, step manager, orchestrator
//! and dispatch loop over injected storage. Hosts construct an
//! [`Engine`], register workers, start the dispatcher, and feed job
//! definitions in.

mod bus;
mod cancellations;
mod config;
mod dispatch;
mod error;
mod manager;
mod orchestrator;
mod registry;
mod spawn;
mod step;
mod template;
mod worker;

#[cfg(test)]
mod test_support;

pub use bus::EventBus;
pub use cancellations::{RunCancellations, RunScope};
pub use config::{EngineConfig, SpawnLimits};
pub use dispatch::{Dispatcher, DispatcherHandle};
pub use error::EngineError;
pub use manager::JobManager;
pub use orchestrator::Orchestrator;
pub use registry::WorkerRegistry;
pub use spawn::{child_job_id, enqueue_job, spawn_children, SpawnOutcome};
pub use step::{StepLaunch, StepManager};
pub use template::{merge_variables, namespace_vars, render, Rendered};
pub use worker::{DefinitionRunner, DefinitionWorker, JobWorker, RunRequest, WorkerCtx};

use fg_core::{DocumentStorage, JobDefinition, JobId, KeyValueStorage, SharedClock};
use fg_storage::{JobStore, Queue};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// External storage injected into the engine.
#[derive(Clone)]
pub struct Capabilities {
    pub documents: Arc<dyn DocumentStorage>,
    pub kv: Arc<dyn KeyValueStorage>,
}

/// Assembled engine: job manager, registry, orchestrator, dispatcher.
pub struct Engine {
    config: EngineConfig,
    manager: Arc<JobManager>,
    queue: Arc<dyn Queue>,
    registry: Arc<WorkerRegistry>,
    bus: EventBus,
    orchestrator: Arc<Orchestrator>,
    dispatcher: Arc<Dispatcher>,
}

impl Engine {
    pub fn new(
        config: EngineConfig,
        clock: SharedClock,
        store: Arc<dyn JobStore>,
        queue: Arc<dyn Queue>,
        capabilities: Capabilities,
    ) -> Self {
        let bus = EventBus::default();
        let registry = Arc::new(WorkerRegistry::new());
        let run_cancels = Arc::new(RunCancellations::new());
        let manager = Arc::new(JobManager::new(
            store,
            bus.clone(),
            clock.clone(),
            config.log_buffer_cap,
        ));
        let orchestrator = Orchestrator::new(
            manager.clone(),
            queue.clone(),
            registry.clone(),
            bus.clone(),
            clock.clone(),
            config.clone(),
            capabilities.documents.clone(),
            capabilities.kv.clone(),
            run_cancels.clone(),
        );
        let dispatcher = Dispatcher::new(
            manager.clone(),
            queue.clone(),
            registry.clone(),
            bus.clone(),
            clock,
            config.clone(),
            capabilities.documents,
            capabilities.kv,
            run_cancels,
            Some(orchestrator.clone() as Arc<dyn DefinitionRunner>),
        );
        Self {
            config,
            manager,
            queue,
            registry,
            bus,
            orchestrator,
            dispatcher,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn manager(&self) -> &Arc<JobManager> {
        &self.manager
    }

    pub fn queue(&self) -> &Arc<dyn Queue> {
        &self.queue
    }

    pub fn registry(&self) -> &Arc<WorkerRegistry> {
        &self.registry
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn orchestrator(&self) -> &Arc<Orchestrator> {
        &self.orchestrator
    }

    /// Start the dispatcher pool.
    pub fn start_dispatcher(&self) -> DispatcherHandle {
        self.dispatcher.start()
    }

    /// Run one job definition to completion; returns the manager job id.
    pub async fn run_definition(
        &self,
        definition: &JobDefinition,
        cancel: &CancellationToken,
    ) -> Result<JobId, EngineError> {
        self.orchestrator.run_definition(definition, cancel).await
    }
}
