//! Document-store abstraction.
//!
//! The [`DocumentStore`] trait is the only surface the request pipeline
//! uses to reach event data, enabling pluggable backends (MongoDB,
//! SQLite, in-memory).
//!
//! Documents are exchanged as `serde_json::Value` objects in relaxed
//! extended-JSON form, so the pipeline can hand them to the language model
//! and the HTTP response without backend-specific types.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{Map, Value};

/// Abstract document store.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`find`](DocumentStore::find) | All documents in a collection matching a filter |
/// | [`aggregate`](DocumentStore::aggregate) | Run an aggregation pipeline on a collection |
/// | [`insert_many`](DocumentStore::insert_many) | Bulk insert, used by `chat-query import` |
///
/// Results are fully materialized; there is no cursor or size cap.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Backend identifier for logs (e.g. `"mongodb"`, `"sqlite"`).
    fn backend_name(&self) -> &str;

    async fn find(&self, collection: &str, filter: &Map<String, Value>) -> Result<Vec<Value>>;

    async fn aggregate(&self, collection: &str, pipeline: &[Value]) -> Result<Vec<Value>>;

    /// Insert documents; returns the number inserted. Every document must be an object.
    async fn insert_many(&self, collection: &str, documents: &[Value]) -> Result<u64>;
}
