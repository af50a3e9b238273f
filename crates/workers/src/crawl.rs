// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Recursive crawl worker.
//!
//! Config schema (`worker = "crawl"`, queue kind `crawl_page`):
//! - `urls` (list of strings, required): seed URLs.
//! - `include_patterns` / `exclude_patterns` (lists of substrings,
//!   default none): link filters, applied before the page budget.
//! - `tags` (list of strings, default none): extra tags on saved
//!   documents.
//!
//! The planner fetches the seeds during init and enqueues their links
//! as first-hop pages; every page executor saves a document
//! (deterministic source id = URL) and spawns newly discovered links
//! through the spawn policy, which enforces the hop depth limit and
//! the per-step page budget.

use crate::util::capability_error;
use async_trait::async_trait;
use fg_core::{
    config, CapabilityError, Document, Event, InitPlan, JobDefinition, JobId, JobPayload,
    LogLevel, StepDefinition, WorkItem, WorkerError, WorkerKind, WorkerResult,
};
use fg_engine::{spawn_children, DefinitionWorker, JobWorker, WorkerCtx};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;

pub const CRAWL_KIND: &str = "crawl";
pub const CRAWL_PAGE_KIND: &str = "crawl_page";

const SEED_PAGES_KEY: &str = "seed_pages";
const DOC_SOURCE_TYPE: &str = "web";

/// One fetched page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchedPage {
    pub url: String,
    pub title: String,
    pub body: String,
    pub links: Vec<String>,
}

/// Page retrieval capability (HTTP client or headless browser in
/// production).
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FetchedPage, CapabilityError>;
}

pub struct CrawlWorker {
    fetcher: Arc<dyn Fetcher>,
}

impl CrawlWorker {
    pub fn new(fetcher: Arc<dyn Fetcher>) -> Self {
        Self { fetcher }
    }

    fn link_filter(config_map: &fg_core::ConfigMap) -> LinkFilter {
        LinkFilter {
            include: config::get_str_list(config_map, "include_patterns"),
            exclude: config::get_str_list(config_map, "exclude_patterns"),
        }
    }

    fn page_item(url: &str, step_config: &fg_core::ConfigMap) -> WorkItem {
        let mut item_config = fg_core::ConfigMap::new();
        item_config.insert("url".into(), serde_json::json!(url));
        for key in ["include_patterns", "exclude_patterns", "tags"] {
            if let Some(value) = step_config.get(key) {
                item_config.insert(key.into(), value.clone());
            }
        }
        WorkItem::new(url, url, CRAWL_PAGE_KIND).config(item_config)
    }

    async fn save_page(
        &self,
        ctx: &WorkerCtx,
        job_id: &JobId,
        page: &FetchedPage,
        tags: &[String],
    ) -> Result<String, WorkerError> {
        let doc = Document::new(DOC_SOURCE_TYPE, &page.url, &page.title, &page.body)
            .tags(tags.to_vec());
        let doc_id = ctx.documents.save(doc).await.map_err(capability_error)?;
        ctx.bus.publish(Event::DocumentSaved {
            job_id: job_id.clone(),
            parent_job_id: None,
            document_id: doc_id.clone(),
            title: page.title.clone(),
            at_ms: ctx.clock.epoch_ms(),
        });
        Ok(doc_id)
    }
}

struct LinkFilter {
    include: Vec<String>,
    exclude: Vec<String>,
}

impl LinkFilter {
    fn keep(&self, url: &str) -> bool {
        if self.exclude.iter().any(|p| url.contains(p.as_str())) {
            return false;
        }
        if self.include.is_empty() {
            return true;
        }
        self.include.iter().any(|p| url.contains(p.as_str()))
    }

    /// Filter, dedupe, and drop already-seen URLs in one pass.
    fn apply(&self, links: &[String], seen: &HashSet<&str>) -> Vec<String> {
        let mut out = Vec::new();
        let mut taken: HashSet<&str> = HashSet::new();
        for link in links {
            if seen.contains(link.as_str()) || taken.contains(link.as_str()) {
                continue;
            }
            if self.keep(link) {
                taken.insert(link.as_str());
                out.push(link.clone());
            }
        }
        out
    }
}

#[async_trait]
impl DefinitionWorker for CrawlWorker {
    fn kind(&self) -> WorkerKind {
        WorkerKind::new(CRAWL_KIND)
    }

    fn returns_child_jobs(&self) -> bool {
        true
    }

    fn validate_config(&self, step: &StepDefinition) -> Result<(), WorkerError> {
        if config::get_str_list(&step.config, "urls").is_empty() {
            return Err(WorkerError::invalid_config(
                "urls",
                "at least one seed url required",
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
        let seeds = config::get_str_list(&step.config, "urls");
        let filter = Self::link_filter(&step.config);

        let mut pages = Vec::with_capacity(seeds.len());
        for url in &seeds {
            ctx.checkpoint()?;
            let page = self.fetcher.fetch(url).await.map_err(capability_error)?;
            pages.push(page);
        }

        let seen: HashSet<&str> = seeds.iter().map(String::as_str).collect();
        let all_links: Vec<String> = pages.iter().flat_map(|p| p.links.clone()).collect();
        let links = filter.apply(&all_links, &seen);

        let items = links
            .iter()
            .map(|url| Self::page_item(url, &step.config))
            .collect();

        let mut metadata = fg_core::ConfigMap::new();
        metadata.insert(
            SEED_PAGES_KEY.into(),
            serde_json::to_value(&pages)
                .map_err(|e| WorkerError::Fatal(format!("encode seed pages: {e}")))?,
        );
        Ok(InitPlan::r#async(items).metadata(metadata))
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

        // Seed pages were fetched during planning; persist them now.
        let tags = config::get_str_list(&step.config, "tags");
        let pages: Vec<FetchedPage> = plan
            .metadata
            .get(SEED_PAGES_KEY)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_default();
        let mut result = WorkerResult {
            source_type: Some(DOC_SOURCE_TYPE.to_string()),
            ..Default::default()
        };
        for page in &pages {
            let doc_id = self.save_page(ctx, step_id, page, &tags).await?;
            result.documents_created += 1;
            result.document_ids.push(doc_id);
            result.source_ids.push(page.url.clone());
        }
        if let Some(value) = result.to_value() {
            let mut patch = fg_core::ConfigMap::new();
            patch.insert(fg_core::META_RESULT.into(), value);
            ctx.manager
                .patch_metadata(step_id, patch)
                .await
                .map_err(|e| WorkerError::TransientIo(e.to_string()))?;
        }

        let outcome = spawn_children(ctx, step_id, None, &plan.work_items).await?;
        ctx.manager.add_log(
            step_id,
            LogLevel::Info,
            format!(
                "crawl seeded: {} pages saved, {} links enqueued",
                pages.len(),
                outcome.spawned.len()
            ),
        );
        Ok(step_id.clone())
    }
}

#[async_trait]
impl JobWorker for CrawlWorker {
    fn queue_kind(&self) -> &str {
        CRAWL_PAGE_KIND
    }

    fn validate(&self, payload: &JobPayload) -> Result<(), WorkerError> {
        if config::get_str(&payload.config, "url").is_none() {
            return Err(WorkerError::invalid_config("url", "required string"));
        }
        if payload.parent_id.is_none() {
            return Err(WorkerError::invalid_config(
                "parent_id",
                "crawl pages attach under a step",
            ));
        }
        Ok(())
    }

    async fn execute(&self, ctx: &WorkerCtx, payload: &JobPayload) -> Result<(), WorkerError> {
        ctx.begin_job(payload).await?;
        let run = async {
            ctx.checkpoint()?;
            let url = config::get_str(&payload.config, "url")
                .unwrap_or_default()
                .to_string();
            // Validated above.
            let step_id = payload
                .parent_id
                .clone()
                .ok_or_else(|| WorkerError::Fatal("missing parent step".into()))?;
            ctx.step_progress(&step_id, "fetching", Some(url.clone()), "running");

            let page = self.fetcher.fetch(&url).await.map_err(capability_error)?;
            ctx.checkpoint()?;

            let tags = config::get_str_list(&payload.config, "tags");
            let doc_id = self.save_page(ctx, &payload.id, &page, &tags).await?;

            let filter = Self::link_filter(&payload.config);
            let seen: HashSet<&str> = std::iter::once(url.as_str()).collect();
            let links = filter.apply(&page.links, &seen);
            let items: Vec<WorkItem> = links
                .iter()
                .map(|link| Self::page_item(link, &payload.config))
                .collect();
            let outcome = spawn_children(ctx, &step_id, Some(payload), &items).await?;
            if outcome.skipped_depth + outcome.skipped_budget > 0 {
                ctx.manager.add_log(
                    &payload.id,
                    LogLevel::Debug,
                    format!(
                        "skipped {} links (depth) and {} links (budget) from {url}",
                        outcome.skipped_depth, outcome.skipped_budget
                    ),
                );
            }

            Ok(WorkerResult {
                documents_created: 1,
                document_ids: vec![doc_id],
                source_type: Some(DOC_SOURCE_TYPE.to_string()),
                source_ids: vec![url],
                tags,
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
#[path = "crawl_tests.rs"]
mod tests;
