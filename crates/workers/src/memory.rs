// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory document and key-value stores.
//!
//! Reference capability implementations: the document store upserts by
//! `(source_type, source_id)`, which is what makes redelivered worker
//! executions idempotent.

use async_trait::async_trait;
use fg_core::{CapabilityError, ConfigMap, Document, DocumentStorage, KeyValueStorage};
use parking_lot::Mutex;
use std::collections::HashMap;

#[derive(Default)]
struct DocInner {
    by_id: HashMap<String, Document>,
    id_by_source: HashMap<(String, String), String>,
    next_id: u64,
}

/// In-memory [`DocumentStorage`].
#[derive(Default)]
pub struct MemoryDocumentStore {
    inner: Mutex<DocInner>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn all(&self) -> Vec<Document> {
        self.inner.lock().by_id.values().cloned().collect()
    }
}

#[async_trait]
impl DocumentStorage for MemoryDocumentStore {
    async fn save(&self, mut doc: Document) -> Result<String, CapabilityError> {
        let mut inner = self.inner.lock();
        let source_key = (doc.source_type.clone(), doc.source_id.clone());
        if let Some(existing_id) = inner.id_by_source.get(&source_key).cloned() {
            if let Some(existing) = inner.by_id.get_mut(&existing_id) {
                existing.title = doc.title;
                existing.body = doc.body;
                existing.tags = doc.tags;
                for (key, value) in doc.metadata {
                    existing.metadata.insert(key, value);
                }
                existing.updated_at_ms = doc.updated_at_ms;
            }
            return Ok(existing_id);
        }
        inner.next_id += 1;
        let id = format!("doc-{}", inner.next_id);
        doc.id = id.clone();
        inner.id_by_source.insert(source_key, id.clone());
        inner.by_id.insert(id.clone(), doc);
        Ok(id)
    }

    async fn get(&self, id: &str) -> Result<Option<Document>, CapabilityError> {
        Ok(self.inner.lock().by_id.get(id).cloned())
    }

    async fn update_metadata(&self, id: &str, patch: ConfigMap) -> Result<(), CapabilityError> {
        let mut inner = self.inner.lock();
        let doc = inner
            .by_id
            .get_mut(id)
            .ok_or_else(|| CapabilityError::Io(format!("document not found: {id}")))?;
        for (key, value) in patch {
            if value.is_null() {
                doc.metadata.remove(&key);
            } else {
                doc.metadata.insert(key, value);
            }
        }
        Ok(())
    }

    async fn search_tags(&self, tags: &[String]) -> Result<Vec<Document>, CapabilityError> {
        let inner = self.inner.lock();
        let mut found: Vec<Document> = inner
            .by_id
            .values()
            .filter(|doc| tags.iter().all(|t| doc.tags.contains(t)))
            .cloned()
            .collect();
        found.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(found)
    }
}

/// In-memory [`KeyValueStorage`].
#[derive(Default)]
pub struct MemoryKeyValueStore {
    inner: Mutex<HashMap<String, String>>,
}

impl MemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStorage for MemoryKeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<String>, CapabilityError> {
        Ok(self.inner.lock().get(key).cloned())
    }

    async fn set(&self, key: &str, value: String) -> Result<(), CapabilityError> {
        self.inner.lock().insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CapabilityError> {
        self.inner.lock().remove(key);
        Ok(())
    }
}

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;
