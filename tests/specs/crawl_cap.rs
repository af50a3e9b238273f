// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Recursive crawl under a global page budget: the seed fans out 8
//! pages, their links only fit 2 more under `max_pages = 10`, and the
//! rest are logged as skipped.

use crate::prelude::*;
use async_trait::async_trait;
use fg_core::{
    CapabilityError, JobDefinition, JobStatus, LogLevel, StepDefinition,
};
use fg_workers::{CrawlWorker, FetchedPage, Fetcher, CRAWL_KIND};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

struct SiteFetcher {
    pages: HashMap<String, FetchedPage>,
}

impl SiteFetcher {
    /// Seed -> 8 pages -> 5 links each.
    fn new() -> Arc<Self> {
        let mut pages = HashMap::new();
        let seed_links: Vec<String> = (0..8).map(|i| format!("https://s.test/p{i}")).collect();
        pages.insert(
            "https://s.test/".to_string(),
            FetchedPage {
                url: "https://s.test/".into(),
                title: "seed".into(),
                body: "seed body".into(),
                links: seed_links.clone(),
            },
        );
        for (i, url) in seed_links.iter().enumerate() {
            let child_links: Vec<String> =
                (0..5).map(|j| format!("https://s.test/p{i}/c{j}")).collect();
            pages.insert(
                url.clone(),
                FetchedPage {
                    url: url.clone(),
                    title: format!("page {i}"),
                    body: format!("body {i}"),
                    links: child_links.clone(),
                },
            );
            for link in child_links {
                pages.insert(
                    link.clone(),
                    FetchedPage {
                        url: link.clone(),
                        title: "leaf page".into(),
                        body: "leaf body".into(),
                        links: vec!["https://s.test/too-deep".into()],
                    },
                );
            }
        }
        Arc::new(Self { pages })
    }
}

#[async_trait]
impl Fetcher for SiteFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedPage, CapabilityError> {
        self.pages
            .get(url)
            .cloned()
            .ok_or_else(|| CapabilityError::Io(format!("404: {url}")))
    }
}

#[tokio::test]
async fn crawl_respects_global_page_budget() {
    let config = fg_engine::EngineConfig {
        // One slot so the check-then-spawn budget is deterministic.
        concurrency: 1,
        max_depth: 2,
        max_pages: 10,
        ..fast_config()
    };
    let rig = rig(config);
    let worker = Arc::new(CrawlWorker::new(SiteFetcher::new()));
    rig.engine.registry().register_planner(worker.clone());
    rig.engine.registry().register_executor(worker);

    let mut step_config = fg_core::ConfigMap::new();
    step_config.insert("urls".into(), json!(["https://s.test/"]));
    let def = JobDefinition::new("site-crawl")
        .step(StepDefinition::new("crawl", CRAWL_KIND).config(step_config));

    let dispatcher = rig.engine.start_dispatcher();
    let cancel = CancellationToken::new();
    let manager_id = rig.engine.run_definition(&def, &cancel).await.unwrap();
    dispatcher.shutdown().await;

    let manager_job = rig.engine.manager().get_job(&manager_id).unwrap();
    assert_eq!(manager_job.status, JobStatus::Completed);

    let steps = rig.engine.manager().children(&manager_id).unwrap();
    let step = &steps[0];
    assert_eq!(step.status, JobStatus::Completed);

    // Exactly the budget: 8 first-hop pages + 2 grandchildren.
    let leaves = rig.engine.manager().children(&step.id).unwrap();
    assert_eq!(leaves.len(), 10);
    assert!(leaves.iter().all(|j| j.status == JobStatus::Completed));
    assert_eq!(leaves.iter().filter(|j| j.depth == 1).count(), 8);
    assert_eq!(leaves.iter().filter(|j| j.depth == 2).count(), 2);

    // Seed + 8 pages + 2 grandchild pages were saved.
    assert_eq!(rig.documents.len(), 11);

    // Skipped candidates were logged on the leaves that hit the cap.
    let logs = rig.engine.manager();
    let skip_logged = leaves.iter().any(|leaf| {
        logs.logs()
            .tail(&leaf.id, 20)
            .iter()
            .any(|l| l.level == LogLevel::Debug && l.message.contains("skipped"))
    });
    assert!(skip_logged, "expected a budget-skip log on some leaf");
}

#[tokio::test]
async fn max_depth_zero_spawns_no_children() {
    let config = fg_engine::EngineConfig {
        concurrency: 1,
        max_depth: 0,
        max_pages: 0,
        ..fast_config()
    };
    let rig = rig(config);
    let worker = Arc::new(CrawlWorker::new(SiteFetcher::new()));
    rig.engine.registry().register_planner(worker.clone());
    rig.engine.registry().register_executor(worker);

    let mut step_config = fg_core::ConfigMap::new();
    step_config.insert("urls".into(), json!(["https://s.test/"]));
    let def = JobDefinition::new("shallow-crawl")
        .step(StepDefinition::new("crawl", CRAWL_KIND).config(step_config));

    let dispatcher = rig.engine.start_dispatcher();
    let cancel = CancellationToken::new();
    let manager_id = rig.engine.run_definition(&def, &cancel).await.unwrap();
    dispatcher.shutdown().await;

    let steps = rig.engine.manager().children(&manager_id).unwrap();
    assert_eq!(steps[0].status, JobStatus::Completed);
    // Seed document saved during planning, but no children spawned.
    assert!(rig.engine.manager().children(&steps[0].id).unwrap().is_empty());
    assert_eq!(rig.documents.len(), 1);
}
