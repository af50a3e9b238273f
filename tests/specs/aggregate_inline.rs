// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Inline aggregation step: no summarizer configured means the step
//! warns and completes without children.

use crate::prelude::*;
use fg_core::{JobDefinition, JobStatus, LogLevel, StepDefinition};
use fg_storage::Queue;
use fg_workers::{AggregateWorker, AGGREGATE_KIND};
use serde_json::json;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn aggregation_without_summarizer_completes_with_warning() {
    let rig = rig(fast_config());
    rig.engine
        .registry()
        .register_planner(Arc::new(AggregateWorker::new(None)));

    let mut config = fg_core::ConfigMap::new();
    config.insert("action".into(), json!("aggregate_devops_summary"));
    let def = JobDefinition::new("devops-rollup")
        .step(StepDefinition::new("summarize", AGGREGATE_KIND).config(config));

    let cancel = CancellationToken::new();
    let manager_id = rig.engine.run_definition(&def, &cancel).await.unwrap();

    let manager_job = rig.engine.manager().get_job(&manager_id).unwrap();
    assert_eq!(manager_job.status, JobStatus::Completed);

    let steps = rig.engine.manager().children(&manager_id).unwrap();
    assert_eq!(steps.len(), 1);
    assert_eq!(steps[0].status, JobStatus::Completed);

    // No children, nothing enqueued, and the warn log is retained.
    assert!(rig.engine.manager().children(&steps[0].id).unwrap().is_empty());
    assert_eq!(rig.queue.pending_len(), 0);
    let logs = rig.engine.manager().logs().tail(&steps[0].id, 20);
    assert!(logs
        .iter()
        .any(|l| l.level == LogLevel::Warn && l.message.contains("no summarizer")));
    assert!(rig.documents.is_empty());
}
