// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Child spawning policy.
//!
//! All descendants of a step attach flat under the step id (lineage is
//! preserved in `metadata.discovered_by`), which keeps child-stats
//! queries and the global page budget a single-parent lookup. Child
//! job ids are deterministic in `(step, work item)` so re-running a
//! step re-uses records instead of duplicating them.
//!
//! The budget check-then-spawn is not atomic across concurrent
//! spawners; overshoot is bounded by `(concurrency - 1) ×
//! links_per_page` and accepted.

use crate::worker::WorkerCtx;
use fg_core::{
    config, Job, JobId, JobPayload, JobSeed, JobStatus, LogLevel, QueueMessage, WorkItem,
    WorkerError, META_DISCOVERED_BY, META_ROOT_PARENT,
};

/// What a spawn request actually did.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SpawnOutcome {
    pub spawned: Vec<JobId>,
    /// Items dropped because the spawn-hop depth limit was reached.
    pub skipped_depth: usize,
    /// Items dropped because the step's page budget was exhausted.
    pub skipped_budget: usize,
    /// Items whose job record already completed (idempotent re-run).
    pub skipped_existing: usize,
}

/// Deterministic child id so redelivered or re-run spawns converge on
/// the same record.
pub fn child_job_id(step_id: &JobId, item_id: &str) -> JobId {
    // FNV-1a over "step\0item"
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in step_id
        .as_str()
        .as_bytes()
        .iter()
        .chain([0u8].iter())
        .chain(item_id.as_bytes())
    {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    JobId::from_string(format!("job-{hash:016x}"))
}

/// Create and enqueue child queue jobs under `step_id`.
///
/// `spawner` is the payload of the leaf doing recursive discovery, or
/// `None` when a planner spawns the first hop. Records are persisted
/// before their messages are enqueued.
pub async fn spawn_children(
    ctx: &WorkerCtx,
    step_id: &JobId,
    spawner: Option<&JobPayload>,
    items: &[WorkItem],
) -> Result<SpawnOutcome, WorkerError> {
    let mut outcome = SpawnOutcome::default();
    if items.is_empty() {
        return Ok(outcome);
    }

    let depth = spawner.map_or(1, |p| p.depth + 1);
    let log_target = spawner.map_or(step_id, |p| &p.id);

    if depth > ctx.limits.max_depth {
        outcome.skipped_depth = items.len();
        ctx.manager.add_log(
            log_target,
            LogLevel::Debug,
            format!(
                "depth limit {} reached, skipped {} items",
                ctx.limits.max_depth,
                items.len()
            ),
        );
        return Ok(outcome);
    }

    let budget = if ctx.limits.max_pages == 0 {
        items.len()
    } else {
        let stats = ctx
            .manager
            .child_stats(std::slice::from_ref(step_id))
            .map_err(|e| WorkerError::TransientIo(e.to_string()))?;
        let existing = stats.get(step_id).map_or(0, |s| s.child_count);
        ctx.limits.max_pages.saturating_sub(existing) as usize
    };

    let (to_spawn, over_budget) = items.split_at(budget.min(items.len()));
    outcome.skipped_budget = over_budget.len();

    let root_parent = spawner
        .and_then(JobPayload::root_parent_id)
        .unwrap_or_else(|| ctx.manager.resolve_root(step_id));

    for item in to_spawn {
        let child_id = child_job_id(step_id, &item.id);
        let job = match ctx
            .manager
            .find_job(&child_id)
            .map_err(|e| WorkerError::TransientIo(e.to_string()))?
        {
            Some(existing) if existing.status == JobStatus::Completed => {
                outcome.skipped_existing += 1;
                continue;
            }
            Some(existing) => existing,
            None => {
                let mut metadata = config::ConfigMap::new();
                metadata.insert(
                    META_ROOT_PARENT.into(),
                    serde_json::Value::String(root_parent.to_string()),
                );
                if let Some(spawner) = spawner {
                    metadata.insert(
                        META_DISCOVERED_BY.into(),
                        serde_json::Value::String(spawner.id.to_string()),
                    );
                }
                let seed = JobSeed::new(item.kind.clone(), item.name.clone())
                    .id(child_id.clone())
                    .parent_id(step_id.clone())
                    .depth(depth)
                    .config(item.config.clone())
                    .metadata(metadata);
                ctx.manager
                    .create_job(seed)
                    .await
                    .map_err(|e| WorkerError::TransientIo(e.to_string()))?
            }
        };

        enqueue_job(ctx, &job)?;
        outcome.spawned.push(child_id);
    }

    if outcome.skipped_budget > 0 {
        ctx.manager.add_log(
            log_target,
            LogLevel::Debug,
            format!(
                "page budget {} reached, skipped {} items",
                ctx.limits.max_pages, outcome.skipped_budget
            ),
        );
    }
    Ok(outcome)
}

/// Enqueue the queue message for an existing job record.
pub fn enqueue_job(ctx: &WorkerCtx, job: &Job) -> Result<(), WorkerError> {
    let msg = QueueMessage::for_job(job, ctx.clock.epoch_ms());
    ctx.queue
        .enqueue(msg)
        .map_err(|e| WorkerError::TransientIo(e.to_string()))
}

#[cfg(test)]
#[path = "spawn_tests.rs"]
mod tests;
