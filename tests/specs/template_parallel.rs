// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Template step expanded over two variable sets: both expansions run
//! as sibling sub-jobs under the step and the step completes when both
//! sub-runs do.

use crate::prelude::*;
use fg_core::{Event, JobDefinition, JobStatus, StepDefinition, KIND_MANAGER};
use fg_workers::{AggregateWorker, TemplateWorker, AGGREGATE_KIND, TEMPLATE_KIND};
use serde_json::json;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

const TEMPLATE: &str = r#"{
  "name": "report-{var:ticker_lower}",
  "steps": [
    {"name": "summarize", "worker": "aggregate",
     "config": {"action": "{var:ticker_lower}_summary"}}
  ]
}"#;

#[tokio::test]
async fn template_expansions_run_as_parallel_sub_jobs() {
    let rig = rig(fast_config());
    rig.engine
        .registry()
        .register_planner(Arc::new(TemplateWorker::new()));
    rig.engine
        .registry()
        .register_planner(Arc::new(AggregateWorker::new(None)));
    let mut events = rig.engine.bus().subscribe();

    let mut step_config = fg_core::ConfigMap::new();
    step_config.insert("template".into(), json!(TEMPLATE));
    step_config.insert(
        "variables".into(),
        json!([{"ticker": "CBA"}, {"ticker": "BHP"}]),
    );
    step_config.insert("parallel".into(), json!(true));
    let def = JobDefinition::new("ticker-reports")
        .step(StepDefinition::new("expand", TEMPLATE_KIND).config(step_config));

    let cancel = CancellationToken::new();
    let manager_id = rig.engine.run_definition(&def, &cancel).await.unwrap();

    let manager_job = rig.engine.manager().get_job(&manager_id).unwrap();
    assert_eq!(manager_job.status, JobStatus::Completed);

    let steps = rig.engine.manager().children(&manager_id).unwrap();
    let step = &steps[0];
    assert_eq!(step.status, JobStatus::Completed);

    // Two sibling sub-manager jobs under the step, both complete.
    let subs = rig.engine.manager().children(&step.id).unwrap();
    assert_eq!(subs.len(), 2);
    assert!(subs.iter().all(|j| j.kind == KIND_MANAGER));
    assert!(subs.iter().all(|j| j.status == JobStatus::Completed));
    let mut names: Vec<&str> = subs.iter().map(|j| j.name.as_str()).collect();
    names.sort_unstable();
    assert_eq!(names, vec!["report-bhp", "report-cba"]);

    // Each sub-run drove its own inline step.
    for sub in &subs {
        let sub_steps = rig.engine.manager().children(&sub.id).unwrap();
        assert_eq!(sub_steps.len(), 1);
        assert_eq!(sub_steps[0].status, JobStatus::Completed);
    }

    // job:spawn events for both expansions carry the step as parent.
    let mut spawned_under_step = 0;
    while let Ok(event) = events.try_recv() {
        if let Event::JobSpawn {
            parent_job_id,
            job_kind,
            ..
        } = event
        {
            if parent_job_id == step.id && job_kind == KIND_MANAGER {
                spawned_under_step += 1;
            }
        }
    }
    assert_eq!(spawned_under_step, 2);
}
