// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Parallel agent fan-out: three matching documents become three leaf
//! jobs; each document ends up with enrichment metadata.

use crate::prelude::*;
use fg_core::{Document, DocumentStorage, JobDefinition, JobStatus, StepDefinition};
use fg_workers::{AgentWorker, AGENT_KIND};
use serde_json::json;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn fan_out_enriches_every_matching_document() {
    let rig = rig(fast_config());
    let worker = Arc::new(AgentWorker::default());
    rig.engine.registry().register_planner(worker.clone());
    rig.engine.registry().register_executor(worker);

    for i in 0..3 {
        rig.documents
            .save(
                Document::new(
                    "web",
                    format!("u{i}"),
                    format!("article {i}"),
                    "gold gold gold copper copper lithium",
                )
                .tags(vec!["news".into()]),
            )
            .await
            .unwrap();
    }
    // One document the filter must not match
    rig.documents
        .save(Document::new("web", "other", "unrelated", "body").tags(vec!["misc".into()]))
        .await
        .unwrap();

    let mut config = fg_core::ConfigMap::new();
    config.insert("agent_type".into(), json!("keyword_extractor"));
    config.insert("filter_tags".into(), json!(["news"]));
    let def = JobDefinition::new("enrich-news")
        .step(StepDefinition::new("extract", AGENT_KIND).config(config));

    let dispatcher = rig.engine.start_dispatcher();
    let cancel = CancellationToken::new();
    let manager_id = rig.engine.run_definition(&def, &cancel).await.unwrap();
    dispatcher.shutdown().await;

    let manager_job = rig.engine.manager().get_job(&manager_id).unwrap();
    assert_eq!(manager_job.status, JobStatus::Completed);

    let steps = rig.engine.manager().children(&manager_id).unwrap();
    let step = &steps[0];
    assert_eq!(step.status, JobStatus::Completed);
    assert_eq!(step.progress_current, 3);
    assert_eq!(step.progress_total, 3);

    let leaves = rig.engine.manager().children(&step.id).unwrap();
    assert_eq!(leaves.len(), 3);
    assert!(leaves.iter().all(|j| j.status == JobStatus::Completed));

    // Every matched document carries the enricher's key
    let enriched = rig.documents.search_tags(&["news".into()]).await.unwrap();
    assert_eq!(enriched.len(), 3);
    for doc in enriched {
        let keywords = doc
            .metadata
            .get("keyword_extractor")
            .and_then(|v| v.get("keywords"))
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default();
        assert_eq!(keywords[0], json!("gold"), "doc {} not enriched", doc.id);
    }
    // The unmatched document is untouched
    let misc = rig.documents.search_tags(&["misc".into()]).await.unwrap();
    assert!(misc[0].metadata.is_empty());
}
