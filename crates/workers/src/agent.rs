// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Document-enrichment fan-out worker.
//!
//! Config schema (`worker = "agent"`):
//! - `agent_type` (string, required): registered enricher to run.
//! - `filter_tags` (list of strings, default all): documents to enrich.
//!
//! The planner discovers matching documents and enqueues one
//! `agent_task` leaf per document; each leaf runs the enricher and
//! patches the document's metadata under the `agent_type` key, so a
//! redelivered leaf just overwrites its own patch.

use crate::util::capability_error;
use async_trait::async_trait;
use fg_core::{
    config, CapabilityError, Document, InitPlan, JobDefinition, JobId, JobPayload, LogLevel,
    StepDefinition, WorkItem, WorkerError, WorkerKind, WorkerResult,
};
use fg_engine::{spawn_children, DefinitionWorker, JobWorker, WorkerCtx};
use std::collections::HashMap;
use std::sync::Arc;

pub const AGENT_KIND: &str = "agent";
pub const AGENT_TASK_KIND: &str = "agent_task";

/// Per-document enrichment capability (LLM- or rule-backed).
#[async_trait]
pub trait Enricher: Send + Sync {
    /// Key under which results land in document metadata, and the
    /// `agent_type` config value that selects this enricher.
    fn name(&self) -> &str;

    async fn enrich(&self, doc: &Document) -> Result<serde_json::Value, CapabilityError>;
}

/// Frequency-based keyword extraction. The stand-in enricher that
/// works without any external service.
pub struct KeywordEnricher {
    top: usize,
}

impl KeywordEnricher {
    pub fn new(top: usize) -> Self {
        Self { top: top.max(1) }
    }
}

impl Default for KeywordEnricher {
    fn default() -> Self {
        Self::new(5)
    }
}

#[async_trait]
impl Enricher for KeywordEnricher {
    fn name(&self) -> &str {
        "keyword_extractor"
    }

    async fn enrich(&self, doc: &Document) -> Result<serde_json::Value, CapabilityError> {
        let mut counts: HashMap<String, usize> = HashMap::new();
        for word in doc.body.split(|c: char| !c.is_alphanumeric()) {
            if word.len() > 3 {
                *counts.entry(word.to_lowercase()).or_insert(0) += 1;
            }
        }
        let mut ranked: Vec<(String, usize)> = counts.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        let keywords: Vec<String> = ranked.into_iter().take(self.top).map(|(w, _)| w).collect();
        Ok(serde_json::json!({ "keywords": keywords }))
    }
}

pub struct AgentWorker {
    enrichers: HashMap<String, Arc<dyn Enricher>>,
}

impl Default for AgentWorker {
    fn default() -> Self {
        Self::new().with_enricher(Arc::new(KeywordEnricher::default()))
    }
}

impl AgentWorker {
    pub fn new() -> Self {
        Self {
            enrichers: HashMap::new(),
        }
    }

    pub fn with_enricher(mut self, enricher: Arc<dyn Enricher>) -> Self {
        self.enrichers.insert(enricher.name().to_string(), enricher);
        self
    }

    fn enricher_for(&self, step_config: &fg_core::ConfigMap) -> Result<Arc<dyn Enricher>, WorkerError> {
        let agent_type = config::get_str(step_config, "agent_type")
            .ok_or_else(|| WorkerError::invalid_config("agent_type", "required string"))?;
        self.enrichers
            .get(agent_type)
            .cloned()
            .ok_or_else(|| {
                WorkerError::invalid_config("agent_type", format!("unknown enricher {agent_type}"))
            })
    }
}

#[async_trait]
impl DefinitionWorker for AgentWorker {
    fn kind(&self) -> WorkerKind {
        WorkerKind::new(AGENT_KIND)
    }

    fn returns_child_jobs(&self) -> bool {
        true
    }

    fn validate_config(&self, step: &StepDefinition) -> Result<(), WorkerError> {
        self.enricher_for(&step.config).map(|_| ())
    }

    async fn init(
        &self,
        ctx: &WorkerCtx,
        step: &StepDefinition,
        _definition: &JobDefinition,
    ) -> Result<InitPlan, WorkerError> {
        let agent_type = config::get_str(&step.config, "agent_type")
            .unwrap_or_default()
            .to_string();
        let tags = config::get_str_list(&step.config, "filter_tags");
        let docs = ctx
            .documents
            .search_tags(&tags)
            .await
            .map_err(capability_error)?;

        let items = docs
            .into_iter()
            .map(|doc| {
                let mut item_config = fg_core::ConfigMap::new();
                item_config.insert("document_id".into(), serde_json::json!(doc.id));
                item_config.insert("agent_type".into(), serde_json::json!(agent_type));
                WorkItem::new(doc.id.clone(), doc.title.clone(), AGENT_TASK_KIND)
                    .config(item_config)
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
        let plan = match init {
            Some(plan) => plan,
            None => self.init(ctx, step, definition).await?,
        };
        ctx.checkpoint()?;
        let outcome = spawn_children(ctx, step_id, None, &plan.work_items).await?;
        ctx.manager.add_log(
            step_id,
            LogLevel::Info,
            format!("enqueued {} enrichment tasks", outcome.spawned.len()),
        );
        Ok(step_id.clone())
    }
}

#[async_trait]
impl JobWorker for AgentWorker {
    fn queue_kind(&self) -> &str {
        AGENT_TASK_KIND
    }

    fn validate(&self, payload: &JobPayload) -> Result<(), WorkerError> {
        if config::get_str(&payload.config, "document_id").is_none() {
            return Err(WorkerError::invalid_config("document_id", "required string"));
        }
        self.enricher_for(&payload.config).map(|_| ())
    }

    async fn execute(&self, ctx: &WorkerCtx, payload: &JobPayload) -> Result<(), WorkerError> {
        ctx.begin_job(payload).await?;
        let run = async {
            ctx.checkpoint()?;
            let document_id = config::get_str(&payload.config, "document_id")
                .unwrap_or_default()
                .to_string();
            let enricher = self.enricher_for(&payload.config)?;

            let doc = ctx
                .documents
                .get(&document_id)
                .await
                .map_err(capability_error)?
                .ok_or_else(|| {
                    WorkerError::PermanentIo(format!("document not found: {document_id}"))
                })?;
            ctx.checkpoint()?;

            let value = enricher.enrich(&doc).await.map_err(capability_error)?;
            let mut patch = fg_core::ConfigMap::new();
            patch.insert(enricher.name().to_string(), value);
            ctx.documents
                .update_metadata(&document_id, patch)
                .await
                .map_err(capability_error)?;

            Ok(WorkerResult {
                source_type: Some(doc.source_type.clone()),
                source_ids: vec![doc.source_id.clone()],
                document_ids: vec![document_id],
                ..Default::default()
            })
        }
        .await;

        match run {
            Ok(result) => ctx.complete_job(payload, 1, &result).await,
            Err(WorkerError::Cancelled) => {
                ctx.cancel_job(payload).await;
                Err(WorkerError::Cancelled)
            }
            Err(err) => {
                ctx.fail_job(payload, &err).await;
                Err(err)
            }
        }
    }
}

#[cfg(test)]
#[path = "agent_tests.rs"]
mod tests;
