//! Local storage ports used by the sync orchestrator.
//!
//! The orchestrator never talks to a database directly. Front ends hand it a
//! [`DocumentStore`] for the document table and a [`KeyValueStore`] for
//! settings and metrics. In-memory implementations are provided for tests
//! and for embedding without persistence.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use thiserror::Error;

use crate::models::Document;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("Storage error: {0}")]
    Backend(String),

    #[error("Stored value for '{key}' is invalid: {detail}")]
    InvalidValue { key: String, detail: String },
}

/// The local document table.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Persist any in-progress edits so `load_all` sees them.
    async fn flush_pending(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn load_all(&self) -> Result<Vec<Document>, StoreError>;

    /// Replace the whole table with `documents`.
    async fn replace_all(&self, documents: &[Document]) -> Result<(), StoreError>;
}

/// String key-value storage.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
    async fn remove(&self, key: &str) -> Result<(), StoreError>;
}

fn poisoned() -> StoreError {
    StoreError::Backend("in-memory store lock poisoned".to_string())
}

/// Document table held in memory.
#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
    documents: Mutex<Vec<Document>>,
}

impl MemoryDocumentStore {
    pub fn new(documents: Vec<Document>) -> Self {
        Self {
            documents: Mutex::new(documents),
        }
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn load_all(&self) -> Result<Vec<Document>, StoreError> {
        Ok(self.documents.lock().map_err(|_| poisoned())?.clone())
    }

    async fn replace_all(&self, documents: &[Document]) -> Result<(), StoreError> {
        *self.documents.lock().map_err(|_| poisoned())? = documents.to_vec();
        Ok(())
    }
}

/// Key-value map held in memory.
#[derive(Debug, Default)]
pub struct MemoryKeyValueStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryKeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.values.lock().map_err(|_| poisoned())?.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.values
            .lock()
            .map_err(|_| poisoned())?
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.values.lock().map_err(|_| poisoned())?.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_document_store_replace() {
        let store = MemoryDocumentStore::new(vec![Document::new("A")]);
        assert_eq!(store.load_all().await.unwrap().len(), 1);

        store
            .replace_all(&[Document::new("B"), Document::new("C")])
            .await
            .unwrap();
        let docs = store.load_all().await.unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].title, "B");

        store.flush_pending().await.unwrap();
    }

    #[tokio::test]
    async fn test_memory_kv_store() {
        let store = MemoryKeyValueStore::new();
        assert!(store.get("k").await.unwrap().is_none());

        store.set("k", "v1").await.unwrap();
        store.set("k", "v2").await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v2"));

        store.remove("k").await.unwrap();
        assert!(store.get("k").await.unwrap().is_none());
        store.remove("k").await.unwrap();
    }
}
