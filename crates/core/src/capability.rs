// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Capability traits for external collaborators.
//!
//! Document and key-value storage are injected into the engine; the
//! core only specifies what it consumes from them. Workers design
//! idempotent keys: `save` upserts by `(source_type, source_id)`, so a
//! redelivered job re-saving the same document must not create a
//! second row.

use crate::config::ConfigMap;
use async_trait::async_trait;
use thiserror::Error;

/// Errors from injected storage backends.
#[derive(Debug, Error)]
pub enum CapabilityError {
    #[error("capability unavailable: {0}")]
    Unavailable(String),
    #[error("storage error: {0}")]
    Io(String),
}

/// A stored document produced by ingestion workers.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Document {
    pub id: String,
    pub source_type: String,
    /// Deterministic upsert key within `source_type` (url, repo path, …).
    pub source_id: String,
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub metadata: ConfigMap,
    pub created_at_ms: u64,
    pub updated_at_ms: u64,
}

impl Document {
    pub fn new(
        source_type: impl Into<String>,
        source_id: impl Into<String>,
        title: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            id: String::new(),
            source_type: source_type.into(),
            source_id: source_id.into(),
            title: title.into(),
            body: body.into(),
            tags: Vec::new(),
            metadata: ConfigMap::new(),
            created_at_ms: 0,
            updated_at_ms: 0,
        }
    }

    crate::setters! {
        set {
            tags: Vec<String>,
            metadata: ConfigMap,
        }
    }
}

/// External document store (search/index layer behind it is opaque).
#[async_trait]
pub trait DocumentStorage: Send + Sync {
    /// Upsert by `(source_type, source_id)`; returns the document id.
    async fn save(&self, doc: Document) -> Result<String, CapabilityError>;

    async fn get(&self, id: &str) -> Result<Option<Document>, CapabilityError>;

    /// Shallow-merge `patch` into the document's metadata.
    async fn update_metadata(&self, id: &str, patch: ConfigMap) -> Result<(), CapabilityError>;

    /// Documents carrying all of `tags`.
    async fn search_tags(&self, tags: &[String]) -> Result<Vec<Document>, CapabilityError>;
}

/// External key-value store (API keys, cached state, templates).
#[async_trait]
pub trait KeyValueStorage: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CapabilityError>;
    async fn set(&self, key: &str, value: String) -> Result<(), CapabilityError>;
    async fn delete(&self, key: &str) -> Result<(), CapabilityError>;
}
