// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cross-cutting invariants observed over a whole run.

use crate::prelude::*;
use fg_core::{
    Document, DocumentStorage, Event, JobDefinition, JobStatus, StepDefinition,
};
use fg_engine::EngineError;
use fg_storage::JobStore;
use fg_workers::{AgentWorker, AGENT_KIND};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

async fn seeded_agent_rig() -> (crate::prelude::Rig, fg_core::JobId) {
    let rig = rig(fast_config());
    let worker = Arc::new(AgentWorker::default());
    rig.engine.registry().register_planner(worker.clone());
    rig.engine.registry().register_executor(worker);

    for i in 0..4 {
        rig.documents
            .save(
                Document::new("web", format!("u{i}"), format!("doc {i}"), "words words words")
                    .tags(vec!["news".into()]),
            )
            .await
            .unwrap();
    }

    let mut config = fg_core::ConfigMap::new();
    config.insert("agent_type".into(), json!("keyword_extractor"));
    config.insert("filter_tags".into(), json!(["news"]));
    let def = JobDefinition::new("invariant-run")
        .step(StepDefinition::new("extract", AGENT_KIND).config(config));

    let dispatcher = rig.engine.start_dispatcher();
    let cancel = CancellationToken::new();
    let manager_id = rig.engine.run_definition(&def, &cancel).await.unwrap();
    dispatcher.shutdown().await;
    (rig, manager_id)
}

#[tokio::test]
async fn terminal_statuses_never_revert() {
    let (rig, manager_id) = seeded_agent_rig().await;
    let jobs = rig.engine.manager().store().list().unwrap();
    assert!(!jobs.is_empty());

    for job in jobs {
        assert!(job.is_terminal(), "job {} not terminal after run", job.id);
        let err = rig
            .engine
            .manager()
            .update_status(&job.id, JobStatus::Running)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidTransition { .. }));
    }
    // And the run itself completed.
    assert_eq!(
        rig.engine.manager().get_job(&manager_id).unwrap().status,
        JobStatus::Completed
    );
}

#[tokio::test]
async fn progress_current_never_exceeds_total() {
    let (rig, _manager_id) = seeded_agent_rig().await;
    let jobs = rig.engine.manager().store().list().unwrap();

    let mut sum_current = 0u64;
    let mut sum_total = 0u64;
    for job in jobs {
        if job.progress_total > 0 {
            assert!(
                job.progress_current <= job.progress_total,
                "job {} progress {}/{}",
                job.id,
                job.progress_current,
                job.progress_total
            );
        }
        sum_current += job.progress_current;
        sum_total += job.progress_total;
    }
    assert!(sum_current <= sum_total);
}

#[tokio::test]
async fn job_log_events_are_monotonic_per_job() {
    let rig = rig(fast_config());
    let worker = Arc::new(AgentWorker::default());
    rig.engine.registry().register_planner(worker.clone());
    rig.engine.registry().register_executor(worker);
    let mut events = rig.engine.bus().subscribe();

    for i in 0..3 {
        rig.documents
            .save(
                Document::new("web", format!("u{i}"), format!("doc {i}"), "words")
                    .tags(vec!["news".into()]),
            )
            .await
            .unwrap();
    }
    let mut config = fg_core::ConfigMap::new();
    config.insert("agent_type".into(), json!("keyword_extractor"));
    config.insert("filter_tags".into(), json!(["news"]));
    let def = JobDefinition::new("log-order")
        .step(StepDefinition::new("extract", AGENT_KIND).config(config));

    let dispatcher = rig.engine.start_dispatcher();
    let cancel = CancellationToken::new();
    let manager_id = rig.engine.run_definition(&def, &cancel).await.unwrap();
    dispatcher.shutdown().await;

    let mut last_at: HashMap<String, u64> = HashMap::new();
    while let Ok(event) = events.try_recv() {
        if let Event::JobLog {
            job_id,
            root_parent_id,
            at_ms,
            ..
        } = event
        {
            assert_eq!(root_parent_id, manager_id, "log correlated to wrong root");
            let last = last_at.entry(job_id.to_string()).or_insert(0);
            assert!(at_ms >= *last, "log went backwards for {job_id}");
            *last = at_ms;
        }
    }
    assert!(!last_at.is_empty(), "expected job log events");
}

#[tokio::test]
async fn empty_fanout_completes_immediately() {
    // No documents match: the step must complete with zero children.
    let rig = rig(fast_config());
    let worker = Arc::new(AgentWorker::default());
    rig.engine.registry().register_planner(worker.clone());
    rig.engine.registry().register_executor(worker);

    let mut config = fg_core::ConfigMap::new();
    config.insert("agent_type".into(), json!("keyword_extractor"));
    config.insert("filter_tags".into(), json!(["nothing-has-this-tag"]));
    let def = JobDefinition::new("empty-run")
        .step(StepDefinition::new("extract", AGENT_KIND).config(config));

    let cancel = CancellationToken::new();
    let manager_id = rig.engine.run_definition(&def, &cancel).await.unwrap();

    let steps = rig.engine.manager().children(&manager_id).unwrap();
    assert_eq!(steps[0].status, JobStatus::Completed);
    assert!(rig.engine.manager().children(&steps[0].id).unwrap().is_empty());
}
