//! In-memory [`DocumentStore`] implementation for testing and local runs.
//!
//! Collections are `Vec<Value>` behind a `std::sync::RwLock`. Filters and
//! pipelines run through [`crate::query`]. Query calls are counted so tests
//! can assert that a request did or did not reach the store.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use serde_json::{Map, Value};

use super::DocumentStore;
use crate::query::{apply_pipeline, matches};

/// In-memory store for testing.
pub struct InMemoryStore {
    collections: RwLock<HashMap<String, Vec<Value>>>,
    next_id: AtomicUsize,
    find_calls: AtomicUsize,
    aggregate_calls: AtomicUsize,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
            next_id: AtomicUsize::new(1),
            find_calls: AtomicUsize::new(0),
            aggregate_calls: AtomicUsize::new(0),
        }
    }

    /// A store pre-seeded with one collection. Documents are stored as given.
    pub fn with_documents(collection: &str, documents: Vec<Value>) -> Self {
        let store = Self::new();
        if let Ok(mut guard) = store.collections.write() {
            guard.insert(collection.to_string(), documents);
        }
        store
    }

    pub fn find_calls(&self) -> usize {
        self.find_calls.load(Ordering::SeqCst)
    }

    pub fn aggregate_calls(&self) -> usize {
        self.aggregate_calls.load(Ordering::SeqCst)
    }

    /// Total `find` + `aggregate` calls.
    pub fn query_calls(&self) -> usize {
        self.find_calls() + self.aggregate_calls()
    }

    fn snapshot(&self, collection: &str) -> Result<Vec<Value>> {
        let guard = self
            .collections
            .read()
            .map_err(|_| anyhow!("in-memory store lock poisoned"))?;
        Ok(guard.get(collection).cloned().unwrap_or_default())
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    fn backend_name(&self) -> &str {
        "memory"
    }

    async fn find(&self, collection: &str, filter: &Map<String, Value>) -> Result<Vec<Value>> {
        self.find_calls.fetch_add(1, Ordering::SeqCst);
        let docs = self.snapshot(collection)?;
        Ok(docs.into_iter().filter(|d| matches(d, filter)).collect())
    }

    async fn aggregate(&self, collection: &str, pipeline: &[Value]) -> Result<Vec<Value>> {
        self.aggregate_calls.fetch_add(1, Ordering::SeqCst);
        let docs = self.snapshot(collection)?;
        Ok(apply_pipeline(docs, pipeline)?)
    }

    async fn insert_many(&self, collection: &str, documents: &[Value]) -> Result<u64> {
        let mut prepared = Vec::with_capacity(documents.len());
        for doc in documents {
            let Value::Object(map) = doc else {
                bail!("documents must be JSON objects");
            };
            let mut map = map.clone();
            if !map.contains_key("_id") {
                let id = self.next_id.fetch_add(1, Ordering::SeqCst);
                map.insert("_id".into(), Value::from(format!("{}-{}", collection, id)));
            }
            prepared.push(Value::Object(map));
        }

        let mut guard = self
            .collections
            .write()
            .map_err(|_| anyhow!("in-memory store lock poisoned"))?;
        let count = prepared.len() as u64;
        guard
            .entry(collection.to_string())
            .or_default()
            .extend(prepared);
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_find_filters_and_counts_calls() {
        let store = InMemoryStore::with_documents(
            "events",
            vec![
                json!({"organization_name": "Acme"}),
                json!({"organization_name": "Globex"}),
            ],
        );
        let filter = json!({"organization_name": "Acme"});
        let hits = store
            .find("events", filter.as_object().unwrap())
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(store.find_calls(), 1);
        assert_eq!(store.query_calls(), 1);
    }

    #[tokio::test]
    async fn test_missing_collection_is_empty() {
        let store = InMemoryStore::new();
        let hits = store.find("nope", &Map::new()).await.unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn test_insert_assigns_ids_and_rejects_scalars() {
        let store = InMemoryStore::new();
        let n = store
            .insert_many("events", &[json!({"a": 1}), json!({"_id": "keep", "a": 2})])
            .await
            .unwrap();
        assert_eq!(n, 2);

        let all = store.find("events", &Map::new()).await.unwrap();
        assert_eq!(all[0]["_id"], json!("events-1"));
        assert_eq!(all[1]["_id"], json!("keep"));

        assert!(store.insert_many("events", &[json!(3)]).await.is_err());
    }

    #[tokio::test]
    async fn test_aggregate_runs_pipeline() {
        let store = InMemoryStore::with_documents(
            "events",
            vec![json!({"t": "click"}), json!({"t": "click"}), json!({"t": "view"})],
        );
        let out = store
            .aggregate(
                "events",
                &[json!({"$match": {"t": "click"}}), json!({"$count": "clicks"})],
            )
            .await
            .unwrap();
        assert_eq!(out, vec![json!({"clicks": 2})]);
        assert_eq!(store.aggregate_calls(), 1);
    }
}
