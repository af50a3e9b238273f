// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Dispatch loop: leases queue messages and runs executors.
//!
//! A pool of worker slots leases messages, resolves the executor for
//! each, runs it under a per-job timeout context, and acks/nacks based
//! on the error class. Retry delays grow exponentially with ±20%
//! jitter. Shutdown is graceful: leasing stops first, in-flight
//! executions get a drain window, then their contexts are cancelled.

use crate::cancellations::RunCancellations;
use crate::config::{EngineConfig, SpawnLimits};
use crate::manager::JobManager;
use crate::registry::WorkerRegistry;
use crate::worker::{DefinitionRunner, WorkerCtx};
use fg_core::{
    DocumentStorage, JobStatus, KeyValueStorage, LogLevel, QueueMessage, SharedClock,
    WorkerError,
};
use fg_storage::Queue;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Retry delay: `base * 2^(attempts-1)`, jittered, capped.
pub(crate) fn retry_delay_ms(base_ms: u64, attempts: u32, cap_ms: u64, jitter: f64) -> u64 {
    let shift = attempts.saturating_sub(1).min(20);
    let exp = base_ms.saturating_mul(1u64 << shift);
    let capped = exp.min(cap_ms);
    ((capped as f64) * jitter) as u64
}

fn jitter_factor() -> f64 {
    rand::rng().random_range(0.8..=1.2)
}

/// A worker slot hit a fatal invariant violation; the slot stops,
/// the others keep running.
struct SlotAbort;

/// Why an execution context was cancelled from outside.
enum CancelCause {
    None,
    Timeout,
    RunCancelled,
}

pub struct Dispatcher {
    manager: Arc<JobManager>,
    queue: Arc<dyn Queue>,
    registry: Arc<WorkerRegistry>,
    bus: crate::EventBus,
    clock: SharedClock,
    config: EngineConfig,
    documents: Arc<dyn DocumentStorage>,
    kv: Arc<dyn KeyValueStorage>,
    run_cancels: Arc<RunCancellations>,
    runner: Option<Arc<dyn DefinitionRunner>>,
}

/// Handle to a running dispatcher pool.
pub struct DispatcherHandle {
    lease_stop: CancellationToken,
    hard_cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
    drain: Duration,
}

impl Dispatcher {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        manager: Arc<JobManager>,
        queue: Arc<dyn Queue>,
        registry: Arc<WorkerRegistry>,
        bus: crate::EventBus,
        clock: SharedClock,
        config: EngineConfig,
        documents: Arc<dyn DocumentStorage>,
        kv: Arc<dyn KeyValueStorage>,
        run_cancels: Arc<RunCancellations>,
        runner: Option<Arc<dyn DefinitionRunner>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            manager,
            queue,
            registry,
            bus,
            clock,
            config,
            documents,
            kv,
            run_cancels,
            runner,
        })
    }

    /// Spawn the worker pool.
    pub fn start(self: &Arc<Self>) -> DispatcherHandle {
        let lease_stop = CancellationToken::new();
        let hard_cancel = CancellationToken::new();
        let tasks = (0..self.config.concurrency.max(1))
            .map(|slot| {
                let dispatcher = self.clone();
                let lease_stop = lease_stop.clone();
                let hard_cancel = hard_cancel.clone();
                tokio::spawn(async move {
                    dispatcher.worker_loop(slot, lease_stop, hard_cancel).await;
                })
            })
            .collect();
        DispatcherHandle {
            lease_stop,
            hard_cancel,
            tasks,
            drain: Duration::from_millis(self.config.drain_timeout_ms),
        }
    }

    async fn worker_loop(
        self: Arc<Self>,
        slot: u32,
        lease_stop: CancellationToken,
        hard_cancel: CancellationToken,
    ) {
        tracing::debug!(slot, "dispatcher slot started");
        loop {
            if lease_stop.is_cancelled() {
                break;
            }
            let msgs = match self.queue.lease(self.config.lease_batch) {
                Ok(msgs) => msgs,
                Err(e) => {
                    tracing::error!(slot, error = %e, "queue lease failed");
                    Vec::new()
                }
            };
            if msgs.is_empty() {
                tokio::select! {
                    _ = lease_stop.cancelled() => break,
                    _ = tokio::time::sleep(Duration::from_millis(self.config.idle_sleep_ms)) => {}
                }
                continue;
            }
            for msg in msgs {
                if self
                    .process(msg, &lease_stop, &hard_cancel)
                    .await
                    .is_err()
                {
                    tracing::error!(slot, "fatal worker error, aborting slot");
                    return;
                }
            }
        }
        tracing::debug!(slot, "dispatcher slot stopped");
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
            runner: self.runner.clone(),
            limits: SpawnLimits::from(&self.config),
        }
    }

    async fn process(
        &self,
        msg: QueueMessage,
        lease_stop: &CancellationToken,
        hard_cancel: &CancellationToken,
    ) -> Result<(), SlotAbort> {
        let job_id = msg.job_id.clone();

        let Some(executor) = self.registry.executor(&msg.kind) else {
            tracing::warn!(job_id = %job_id, kind = %msg.kind, "no executor registered, dead-lettering");
            self.fail_terminal(&msg, &format!("no executor registered for {}", msg.kind))
                .await;
            return Ok(());
        };

        // A redelivered message is a fresh attempt on the same record.
        if msg.attempts > 1 {
            match self.manager.find_job(&job_id) {
                Ok(Some(job)) if job.is_terminal() => {
                    if let Err(e) = self
                        .manager
                        .reset_for_redelivery(&job_id, msg.attempts)
                        .await
                    {
                        tracing::warn!(job_id = %job_id, error = %e, "redelivery reset failed");
                    }
                }
                _ => {}
            }
        }

        if let Err(e) = executor.validate(&msg.payload) {
            self.fail_terminal(&msg, &e.to_string()).await;
            return Ok(());
        }

        // Cancelling a run must reach its in-flight leaves, so each
        // execution watches the cancel token of the run that owns it.
        let root = msg
            .payload
            .root_parent_id()
            .unwrap_or_else(|| self.manager.resolve_root(&job_id));
        if let Ok(Some(root_job)) = self.manager.find_job(&root) {
            if root_job.status == JobStatus::Cancelled {
                // Leased after its run was cancelled: retire, don't run.
                if let Err(e) = self
                    .manager
                    .update_status(&job_id, JobStatus::Cancelled)
                    .await
                {
                    tracing::debug!(job_id = %job_id, error = %e, "late-leaf cancel skipped");
                }
                self.manager
                    .add_log(&job_id, LogLevel::Warn, "run cancelled before execution");
                if let Err(e) = self.queue.ack(&msg.id) {
                    tracing::warn!(msg_id = %msg.id, error = %e, "ack failed");
                }
                return Ok(());
            }
        }
        let run_cancel = self.run_cancels.find(&root).unwrap_or_default();

        let ctx = self.worker_ctx(hard_cancel.child_token());
        let timeout = Duration::from_millis(self.config.execute_timeout_ms);
        let mut cause = CancelCause::None;
        let fut = executor.execute(&ctx, &msg.payload);
        tokio::pin!(fut);
        let result = tokio::select! {
            r = &mut fut => r,
            _ = tokio::time::sleep(timeout) => {
                tracing::warn!(job_id = %job_id, timeout_ms = self.config.execute_timeout_ms, "execution timed out, cancelling context");
                cause = CancelCause::Timeout;
                ctx.cancel.cancel();
                fut.await
            }
            _ = run_cancel.cancelled() => {
                tracing::info!(job_id = %job_id, root = %root, "run cancelled, cancelling in-flight execution");
                cause = CancelCause::RunCancelled;
                ctx.cancel.cancel();
                fut.await
            }
        };

        match result {
            Ok(()) => {
                if let Err(e) = self.queue.ack(&msg.id) {
                    tracing::warn!(msg_id = %msg.id, error = %e, "ack failed");
                }
                Ok(())
            }
            Err(WorkerError::Cancelled) if matches!(cause, CancelCause::RunCancelled) => {
                // The owning run is gone: the job stays cancelled and
                // the message retires instead of retrying.
                if let Err(e) = self.queue.ack(&msg.id) {
                    tracing::warn!(msg_id = %msg.id, error = %e, "ack failed");
                }
                Ok(())
            }
            Err(WorkerError::Cancelled) if lease_stop.is_cancelled() => {
                // Shutdown drain: give the message back for the next run.
                if let Err(e) = self.queue.nack(&msg.id, None) {
                    tracing::warn!(msg_id = %msg.id, error = %e, "shutdown nack failed");
                }
                Ok(())
            }
            Err(err) => {
                let fatal = matches!(err, WorkerError::Fatal(_));
                if err.is_retryable() && msg.attempts < self.config.max_attempts {
                    let delay = retry_delay_ms(
                        self.config.retry_base_ms,
                        msg.attempts,
                        self.config.retry_cap_ms,
                        jitter_factor(),
                    );
                    self.manager.add_log(
                        &job_id,
                        LogLevel::Warn,
                        format!(
                            "attempt {} failed, retrying in {delay} ms: {err}",
                            msg.attempts
                        ),
                    );
                    if let Err(e) = self.queue.nack(&msg.id, Some(delay)) {
                        tracing::warn!(msg_id = %msg.id, error = %e, "nack failed");
                    }
                } else {
                    self.fail_terminal(
                        &msg,
                        &format!("failed after {} attempts: {err}", msg.attempts),
                    )
                    .await;
                }
                if fatal {
                    return Err(SlotAbort);
                }
                Ok(())
            }
        }
    }

    /// Terminal failure: record it on the job and dead-letter the
    /// message.
    async fn fail_terminal(&self, msg: &QueueMessage, reason: &str) {
        if let Err(e) = self.manager.force_fail(&msg.job_id, reason).await {
            tracing::warn!(job_id = %msg.job_id, error = %e, "terminal failure mark skipped");
        }
        if let Err(e) = self.queue.bury(&msg.id) {
            tracing::warn!(msg_id = %msg.id, error = %e, "bury failed");
        }
    }
}

impl DispatcherHandle {
    /// Stop leasing, drain in-flight work, then cancel stragglers.
    pub async fn shutdown(self) {
        self.lease_stop.cancel();
        let deadline = tokio::time::Instant::now() + self.drain;
        let mut remaining = Vec::new();
        for mut task in self.tasks {
            let left = deadline.saturating_duration_since(tokio::time::Instant::now());
            match tokio::time::timeout(left, &mut task).await {
                Ok(_) => {}
                Err(_) => remaining.push(task),
            }
        }
        if remaining.is_empty() {
            return;
        }
        tracing::warn!(
            stragglers = remaining.len(),
            "drain deadline passed, cancelling in-flight executions"
        );
        self.hard_cancel.cancel();
        for mut task in remaining {
            // Cooperative cancellation should unwind promptly; abort as
            // a last resort.
            if tokio::time::timeout(Duration::from_secs(1), &mut task)
                .await
                .is_err()
            {
                task.abort();
            }
        }
    }

    /// Cancel everything immediately (tests, panic paths).
    pub fn abort(self) {
        self.lease_stop.cancel();
        self.hard_cancel.cancel();
        for task in self.tasks {
            task.abort();
        }
    }
}

#[cfg(test)]
#[path = "dispatch_tests.rs"]
mod tests;
