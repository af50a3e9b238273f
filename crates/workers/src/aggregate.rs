// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Inline aggregation worker.
//!
//! Config schema (`worker = "aggregate"`):
//! - `action` (string, required): name of the summary to produce; also
//!   the deterministic source id of the output document.
//! - `filter_tags` (list of strings, default all): documents to fold
//!   into the summary.
//!
//! Runs entirely inside `create_jobs` (strategy inline, no children).
//! Without a configured summarizer the step logs a warning and
//! completes — a missing LLM backend must not fail an ingestion run.

use crate::util::capability_error;
use async_trait::async_trait;
use fg_core::{
    config, CapabilityError, Document, Event, InitPlan, JobDefinition, JobId, LogLevel,
    StepDefinition, WorkerError, WorkerKind, WorkerResult, META_RESULT,
};
use fg_engine::{DefinitionWorker, WorkerCtx};
use std::sync::Arc;

pub const AGGREGATE_KIND: &str = "aggregate";

/// Text summarization capability (an LLM provider in production).
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, action: &str, corpus: &str) -> Result<String, CapabilityError>;
}

pub struct AggregateWorker {
    summarizer: Option<Arc<dyn Summarizer>>,
}

impl AggregateWorker {
    pub fn new(summarizer: Option<Arc<dyn Summarizer>>) -> Self {
        Self { summarizer }
    }
}

#[async_trait]
impl DefinitionWorker for AggregateWorker {
    fn kind(&self) -> WorkerKind {
        WorkerKind::new(AGGREGATE_KIND)
    }

    fn validate_config(&self, step: &StepDefinition) -> Result<(), WorkerError> {
        match config::get_str(&step.config, "action") {
            Some(action) if !action.is_empty() => Ok(()),
            _ => Err(WorkerError::invalid_config("action", "required string")),
        }
    }

    async fn init(
        &self,
        _ctx: &WorkerCtx,
        step: &StepDefinition,
        _definition: &JobDefinition,
    ) -> Result<InitPlan, WorkerError> {
        let action = config::get_str(&step.config, "action").unwrap_or_default();
        Ok(InitPlan::inline(action))
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
        let action = config::get_str(&step.config, "action")
            .unwrap_or_default()
            .to_string();

        let Some(summarizer) = &self.summarizer else {
            ctx.manager.add_log(
                step_id,
                LogLevel::Warn,
                format!("no summarizer configured, skipping {action}"),
            );
            return Ok(step_id.clone());
        };

        let tags = config::get_str_list(&step.config, "filter_tags");
        let docs = ctx
            .documents
            .search_tags(&tags)
            .await
            .map_err(capability_error)?;
        ctx.checkpoint()?;

        let corpus: String = docs
            .iter()
            .map(|d| format!("# {}\n{}\n", d.title, d.body))
            .collect();
        let summary = summarizer
            .summarize(&action, &corpus)
            .await
            .map_err(capability_error)?;
        ctx.checkpoint()?;

        let doc = Document::new(AGGREGATE_KIND, &action, format!("{action} summary"), summary)
            .tags(vec!["summary".to_string(), action.clone()]);
        let doc_id = ctx.documents.save(doc).await.map_err(capability_error)?;
        ctx.bus.publish(Event::DocumentSaved {
            job_id: step_id.clone(),
            parent_job_id: None,
            document_id: doc_id.clone(),
            title: format!("{action} summary"),
            at_ms: ctx.clock.epoch_ms(),
        });

        let result = WorkerResult {
            documents_created: 1,
            document_ids: vec![doc_id],
            source_type: Some(AGGREGATE_KIND.to_string()),
            source_ids: vec![action.clone()],
            ..Default::default()
        };
        if let Some(value) = result.to_value() {
            let mut patch = fg_core::ConfigMap::new();
            patch.insert(META_RESULT.into(), value);
            ctx.manager
                .patch_metadata(step_id, patch)
                .await
                .map_err(|e| WorkerError::TransientIo(e.to_string()))?;
        }
        ctx.manager.add_log(
            step_id,
            LogLevel::Info,
            format!("aggregated {} documents into {action}", docs.len()),
        );
        Ok(step_id.clone())
    }
}

#[cfg(test)]
#[path = "aggregate_tests.rs"]
mod tests;
