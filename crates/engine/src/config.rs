// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Engine tuning knobs.

use serde::{Deserialize, Serialize};

/// Engine configuration with serde-level defaults so hosts can layer
/// it from TOML/JSON. Every duration is in milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Dispatcher worker slots.
    pub concurrency: u32,
    /// Messages leased per queue poll.
    pub lease_batch: usize,
    /// Queue visibility timeout.
    pub lease_timeout_ms: u64,
    /// Delivery attempts before a message is dead-lettered.
    pub max_attempts: u32,
    /// First retry delay; doubles per attempt.
    pub retry_base_ms: u64,
    /// Retry delay ceiling.
    pub retry_cap_ms: u64,
    /// Per-execution timeout for one leaf job.
    pub execute_timeout_ms: u64,
    /// Dispatcher idle sleep when the queue is empty.
    pub idle_sleep_ms: u64,
    /// Orchestrator child-stats poll interval.
    pub poll_interval_ms: u64,
    /// Per-step completion deadline.
    pub step_timeout_ms: u64,
    /// How long a stopping dispatcher lets in-flight executions drain.
    pub drain_timeout_ms: u64,
    /// Recursive spawn-hop ceiling for crawler-class workers.
    /// 0 means recursive workers spawn nothing.
    pub max_depth: u32,
    /// Leaf-job budget per step. 0 means unlimited.
    pub max_pages: u64,
    /// Per-job log ring capacity.
    pub log_buffer_cap: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            lease_batch: 8,
            lease_timeout_ms: 5 * 60 * 1000,
            max_attempts: 5,
            retry_base_ms: 1_000,
            retry_cap_ms: 5 * 60 * 1000,
            execute_timeout_ms: 30_000,
            idle_sleep_ms: 250,
            poll_interval_ms: 5_000,
            step_timeout_ms: 10 * 60 * 1000,
            drain_timeout_ms: 10_000,
            max_depth: 3,
            max_pages: 0,
            log_buffer_cap: 1_000,
        }
    }
}

/// Spawn limits handed to workers through their context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpawnLimits {
    pub max_depth: u32,
    pub max_pages: u64,
}

impl From<&EngineConfig> for SpawnLimits {
    fn from(config: &EngineConfig) -> Self {
        Self {
            max_depth: config.max_depth,
            max_pages: config.max_pages,
        }
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
