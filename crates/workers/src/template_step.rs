// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Template expansion worker.
//!
//! Config schema (`worker = "template"`):
//! - `template` (string) or `template_key` (string): inline template
//!   text, or a key-value store key holding it. The template is a JSON
//!   job definition with `{var:key}` placeholders (`_lower`/`_upper`
//!   modifiers supported).
//! - `variables` (list of objects, required): one expansion per set.
//! - `parallel` (bool, default false): run expansions concurrently
//!   instead of one after another.
//!
//! Job-level `config.variables` merge under each set (the set wins on
//! clashes). Each expansion becomes a sub-definition run: its manager
//! record is created under the step before the run starts, so the
//! orchestrator's child polling sees every sub-job up front.

use crate::util::{capability_error, engine_error};
use async_trait::async_trait;
use fg_core::{
    config, ConfigMap, InitPlan, JobDefinition, JobId, JobSeed, LogLevel, StepDefinition,
    WorkItem, WorkerError, WorkerKind, KIND_MANAGER, META_ROOT_PARENT,
};
use fg_engine::{
    merge_variables, namespace_vars, render, DefinitionRunner, DefinitionWorker, RunRequest,
    WorkerCtx,
};
use std::sync::Arc;

pub const TEMPLATE_KIND: &str = "template";

pub struct TemplateWorker;

impl TemplateWorker {
    pub fn new() -> Self {
        Self
    }

    async fn load_template(
        ctx: &WorkerCtx,
        step: &StepDefinition,
    ) -> Result<String, WorkerError> {
        if let Some(text) = config::get_str(&step.config, "template") {
            return Ok(text.to_string());
        }
        let key = config::get_str(&step.config, "template_key")
            .ok_or_else(|| {
                WorkerError::invalid_config("template", "template or template_key required")
            })?;
        ctx.kv
            .get(key)
            .await
            .map_err(capability_error)?
            .ok_or_else(|| WorkerError::PermanentIo(format!("template not found: {key}")))
    }

    /// Expand one variable set into a sub-definition.
    fn expand(
        ctx: &WorkerCtx,
        step_id: &JobId,
        template: &str,
        job_vars: &ConfigMap,
        set: &ConfigMap,
    ) -> Result<JobDefinition, WorkerError> {
        let merged = merge_variables(job_vars, set);
        let vars = namespace_vars("var", &merged);
        let rendered = render(template, &vars);
        for missing in &rendered.missing {
            ctx.manager.add_log(
                step_id,
                LogLevel::Warn,
                format!("template placeholder left verbatim: {{{missing}}}"),
            );
        }
        serde_json::from_str(&rendered.text)
            .map_err(|e| WorkerError::PermanentIo(format!("expanded template is not a job definition: {e}")))
    }
}

impl Default for TemplateWorker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DefinitionWorker for TemplateWorker {
    fn kind(&self) -> WorkerKind {
        WorkerKind::new(TEMPLATE_KIND)
    }

    fn returns_child_jobs(&self) -> bool {
        true
    }

    fn validate_config(&self, step: &StepDefinition) -> Result<(), WorkerError> {
        let has_template = config::get_str(&step.config, "template").is_some()
            || config::get_str(&step.config, "template_key").is_some();
        if !has_template {
            return Err(WorkerError::invalid_config(
                "template",
                "template or template_key required",
            ));
        }
        Ok(())
    }

    async fn init(
        &self,
        ctx: &WorkerCtx,
        step: &StepDefinition,
        _definition: &JobDefinition,
    ) -> Result<InitPlan, WorkerError> {
        // Resolve the template during planning so a missing key fails
        // before any sub-job exists.
        let _ = Self::load_template(ctx, step).await?;
        let sets = config::get_object_list(&step.config, "variables");
        let items = sets
            .iter()
            .enumerate()
            .map(|(i, set)| {
                let label = set
                    .values()
                    .filter_map(|v| v.as_str())
                    .collect::<Vec<_>>()
                    .join(" ");
                WorkItem::new(format!("set-{i}"), label, KIND_MANAGER)
            })
            .collect();
        Ok(InitPlan::parallel(items))
    }

    async fn create_jobs(
        &self,
        ctx: &WorkerCtx,
        step: &StepDefinition,
        definition: &JobDefinition,
        step_id: &JobId,
        init: Option<InitPlan>,
    ) -> Result<JobId, WorkerError> {
        if init.is_none() {
            self.init(ctx, step, definition).await?;
        }
        let template = Self::load_template(ctx, step).await?;
        let runner: Arc<dyn DefinitionRunner> = ctx
            .runner
            .clone()
            .ok_or_else(|| WorkerError::Fatal("no definition runner wired".into()))?;

        let job_vars = definition.variables();
        let sets = config::get_object_list(&step.config, "variables");
        let parallel = config::get_bool(&step.config, "parallel");
        let root_parent = ctx.manager.resolve_root(step_id);

        // Create every sub-manager record up front, then run them; the
        // step's child stats are complete from the first poll.
        let mut runs = Vec::with_capacity(sets.len());
        for set in sets {
            ctx.checkpoint()?;
            let sub_def = Self::expand(ctx, step_id, &template, &job_vars, set)?;
            let mut metadata = ConfigMap::new();
            metadata.insert(
                META_ROOT_PARENT.into(),
                serde_json::Value::String(root_parent.to_string()),
            );
            let record = ctx
                .manager
                .create_job(
                    JobSeed::new(KIND_MANAGER, sub_def.name.clone())
                        .parent_id(step_id.clone())
                        .depth(2)
                        .metadata(metadata),
                )
                .await
                .map_err(engine_error)?;
            runs.push((record.id, sub_def));
        }

        ctx.manager.add_log(
            step_id,
            LogLevel::Info,
            format!(
                "template expanded into {} sub-jobs ({})",
                runs.len(),
                if parallel { "parallel" } else { "sequential" }
            ),
        );

        if parallel {
            for (manager_id, sub_def) in runs {
                let runner = runner.clone();
                let cancel = ctx.cancel.child_token();
                tokio::spawn(async move {
                    let req = RunRequest::new(sub_def).manager_id(manager_id.clone());
                    if let Err(e) = runner.run(req, cancel).await {
                        tracing::error!(job_id = %manager_id, error = %e, "sub-definition run failed");
                    }
                });
            }
        } else {
            let runner = runner.clone();
            let cancel = ctx.cancel.child_token();
            tokio::spawn(async move {
                for (manager_id, sub_def) in runs {
                    let req = RunRequest::new(sub_def).manager_id(manager_id.clone());
                    if let Err(e) = runner.run(req, cancel.child_token()).await {
                        tracing::error!(job_id = %manager_id, error = %e, "sub-definition run failed");
                    }
                }
            });
        }
        Ok(step_id.clone())
    }
}

#[cfg(test)]
#[path = "template_step_tests.rs"]
mod tests;
