// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::test_util::{harness, seed_step, Harness};
use fg_core::{Event, JobStatus, KeyValueStorage};
use fg_engine::{EngineError, JobManager};
use tokio_util::sync::CancellationToken;

/// Marks pre-created sub-managers completed, recording what it ran.
struct StubRunner {
    manager: Arc<JobManager>,
    ran: parking_lot::Mutex<Vec<String>>,
}

#[async_trait]
impl DefinitionRunner for StubRunner {
    async fn run(
        &self,
        req: RunRequest,
        _cancel: CancellationToken,
    ) -> Result<JobId, EngineError> {
        let id = match req.manager_id {
            Some(id) => id,
            None => return Err(EngineError::JobNotFound(JobId::from_string("job-none"))),
        };
        self.ran.lock().push(req.definition.name.clone());
        self.manager.update_status(&id, JobStatus::Running).await?;
        self.manager
            .update_status(&id, JobStatus::Completed)
            .await?;
        Ok(id)
    }
}

fn with_runner(h: &Harness) -> (WorkerCtx, Arc<StubRunner>) {
    let runner = Arc::new(StubRunner {
        manager: h.manager.clone(),
        ran: parking_lot::Mutex::new(Vec::new()),
    });
    let mut ctx = h.ctx.clone();
    ctx.runner = Some(runner.clone());
    (ctx, runner)
}

const TEMPLATE: &str =
    r#"{"name": "sub-{var:ticker_lower}", "config": {"exchange": "{var:exchange}"}, "steps": []}"#;

fn template_step(parallel: bool) -> StepDefinition {
    let mut config = fg_core::ConfigMap::new();
    config.insert("template".into(), serde_json::json!(TEMPLATE));
    config.insert(
        "variables".into(),
        serde_json::json!([{"ticker": "CBA"}, {"ticker": "BHP"}]),
    );
    config.insert("parallel".into(), serde_json::json!(parallel));
    StepDefinition::new("expand", TEMPLATE_KIND).config(config)
}

fn definition_with_globals() -> JobDefinition {
    let mut config = fg_core::ConfigMap::new();
    config.insert("variables".into(), serde_json::json!({"exchange": "ASX"}));
    JobDefinition::new("root").config(config)
}

async fn wait_for<F: Fn() -> bool>(cond: F, what: &str) {
    for _ in 0..200 {
        if cond() {
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }
    panic!("timed out waiting for {what}");
}

#[test]
fn validate_requires_template_source() {
    let worker = TemplateWorker::new();
    assert!(worker.validate_config(&template_step(false)).is_ok());
    assert!(matches!(
        worker.validate_config(&StepDefinition::new("expand", TEMPLATE_KIND)),
        Err(WorkerError::InvalidConfig { .. })
    ));
}

#[tokio::test]
async fn init_plans_one_item_per_variable_set() {
    let h = harness();
    let worker = TemplateWorker::new();
    let plan = worker
        .init(&h.ctx, &template_step(false), &definition_with_globals())
        .await
        .unwrap();
    assert_eq!(plan.total_count, 2);
}

#[tokio::test]
async fn template_key_loads_from_kv_store() {
    let h = harness();
    h.kv.set("tpl", TEMPLATE.to_string()).await.unwrap();

    let mut config = fg_core::ConfigMap::new();
    config.insert("template_key".into(), serde_json::json!("tpl"));
    config.insert("variables".into(), serde_json::json!([{"ticker": "CBA"}]));
    let step = StepDefinition::new("expand", TEMPLATE_KIND).config(config);

    let worker = TemplateWorker::new();
    let plan = worker
        .init(&h.ctx, &step, &definition_with_globals())
        .await
        .unwrap();
    assert_eq!(plan.total_count, 1);
}

#[tokio::test]
async fn missing_template_key_is_permanent() {
    let h = harness();
    let mut config = fg_core::ConfigMap::new();
    config.insert("template_key".into(), serde_json::json!("absent"));
    let step = StepDefinition::new("expand", TEMPLATE_KIND).config(config);

    let err = TemplateWorker::new()
        .init(&h.ctx, &step, &definition_with_globals())
        .await
        .unwrap_err();
    assert!(matches!(err, WorkerError::PermanentIo(_)));
}

#[tokio::test]
async fn create_jobs_precreates_sub_managers_and_runs_them() {
    let h = harness();
    let (_mgr, step_id) = seed_step(&h, "expand").await;
    let (ctx, runner) = with_runner(&h);
    let mut rx = h.bus.subscribe();

    let worker = TemplateWorker::new();
    let out = worker
        .create_jobs(
            &ctx,
            &template_step(true),
            &definition_with_globals(),
            &step_id,
            None,
        )
        .await
        .unwrap();
    assert_eq!(out, step_id);

    // Sub-manager records exist under the step immediately
    let subs = h.manager.children(&step_id).unwrap();
    assert_eq!(subs.len(), 2);
    assert!(subs.iter().all(|j| j.kind == fg_core::KIND_MANAGER));
    assert!(subs.iter().all(|j| j.depth == 2));
    let names: Vec<&str> = subs.iter().map(|j| j.name.as_str()).collect();
    assert!(names.contains(&"sub-cba"));
    assert!(names.contains(&"sub-bhp"));

    // Spawn events carry the step as parent
    let mut spawn_parents = Vec::new();
    while let Ok(event) = rx.try_recv() {
        if let Event::JobSpawn { parent_job_id, .. } = event {
            spawn_parents.push(parent_job_id);
        }
    }
    assert_eq!(spawn_parents.iter().filter(|p| **p == step_id).count(), 2);

    // Runner drives both to completion
    let manager = h.manager.clone();
    let step = step_id.clone();
    wait_for(
        || {
            manager
                .children(&step)
                .map(|subs| subs.iter().all(|j| j.status == JobStatus::Completed))
                .unwrap_or(false)
        },
        "sub-definition completion",
    )
    .await;
    assert_eq!(runner.ran.lock().len(), 2);
}

#[tokio::test]
async fn sequential_mode_runs_in_order() {
    let h = harness();
    let (_mgr, step_id) = seed_step(&h, "expand").await;
    let (ctx, runner) = with_runner(&h);

    TemplateWorker::new()
        .create_jobs(
            &ctx,
            &template_step(false),
            &definition_with_globals(),
            &step_id,
            None,
        )
        .await
        .unwrap();

    let runner_ref = runner.clone();
    wait_for(|| runner_ref.ran.lock().len() == 2, "sequential runs").await;
    assert_eq!(*runner.ran.lock(), vec!["sub-cba", "sub-bhp"]);
}

#[tokio::test]
async fn job_globals_merge_with_set_winning_on_clash() {
    let h = harness();
    let (_mgr, step_id) = seed_step(&h, "expand").await;
    let (ctx, _runner) = with_runner(&h);

    let mut config = fg_core::ConfigMap::new();
    config.insert("template".into(), serde_json::json!(TEMPLATE));
    config.insert(
        "variables".into(),
        // Set overrides the job-level exchange
        serde_json::json!([{"ticker": "CBA", "exchange": "NYSE"}]),
    );
    let step = StepDefinition::new("expand", TEMPLATE_KIND).config(config);

    TemplateWorker::new()
        .create_jobs(&ctx, &step, &definition_with_globals(), &step_id, None)
        .await
        .unwrap();

    let subs = h.manager.children(&step_id).unwrap();
    assert_eq!(subs.len(), 1);
    assert_eq!(subs[0].name, "sub-cba");
}

#[tokio::test]
async fn missing_placeholder_warns_and_stays_verbatim() {
    let h = harness();
    let (_mgr, step_id) = seed_step(&h, "expand").await;
    let (ctx, _runner) = with_runner(&h);

    let mut config = fg_core::ConfigMap::new();
    config.insert(
        "template".into(),
        serde_json::json!(r#"{"name": "sub-{var:absent}", "steps": []}"#),
    );
    config.insert("variables".into(), serde_json::json!([{"ticker": "CBA"}]));
    let step = StepDefinition::new("expand", TEMPLATE_KIND).config(config);

    TemplateWorker::new()
        .create_jobs(&ctx, &step, &definition_with_globals(), &step_id, None)
        .await
        .unwrap();

    let subs = h.manager.children(&step_id).unwrap();
    assert_eq!(subs[0].name, "sub-{var:absent}");
    let logs = h.manager.logs().tail(&step_id, 10);
    assert!(logs
        .iter()
        .any(|l| l.level == fg_core::LogLevel::Warn && l.message.contains("var:absent")));
}

#[tokio::test]
async fn non_definition_expansion_is_permanent_failure() {
    let h = harness();
    let (_mgr, step_id) = seed_step(&h, "expand").await;
    let (ctx, _runner) = with_runner(&h);

    let mut config = fg_core::ConfigMap::new();
    config.insert("template".into(), serde_json::json!("not json at all"));
    config.insert("variables".into(), serde_json::json!([{"ticker": "CBA"}]));
    let step = StepDefinition::new("expand", TEMPLATE_KIND).config(config);

    let err = TemplateWorker::new()
        .create_jobs(&ctx, &step, &definition_with_globals(), &step_id, None)
        .await
        .unwrap_err();
    assert!(matches!(err, WorkerError::PermanentIo(_)));
}
