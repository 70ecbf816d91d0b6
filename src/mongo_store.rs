//! MongoDB-backed [`DocumentStore`].
//!
//! Filters and pipelines are sent to the server unchanged after
//! conversion from JSON. Extended-JSON wrappers such as
//! `{"$date": "2024-01-01T00:00:00Z"}` become native BSON values, so a
//! model-written filter can compare against real dates. Results come back
//! as relaxed extended JSON.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::bson::{doc, Bson, Document};
use mongodb::options::ClientOptions;
use mongodb::{Client, Database};
use serde_json::{Map, Value};
use std::time::Duration;

use chat_query_core::store::DocumentStore;

pub struct MongoStore {
    db: Database,
}

impl MongoStore {
    /// Connect, select `database`, and ping it so failures surface now
    /// rather than on the first query.
    pub async fn connect(uri: &str, database: &str, timeout: Duration) -> Result<Self> {
        let mut options = ClientOptions::parse(uri)
            .await
            .context("invalid MongoDB connection string")?;
        options.app_name = Some("chat-query".to_string());
        options.connect_timeout = Some(timeout);
        options.server_selection_timeout = Some(timeout);

        let client = Client::with_options(options)?;
        let db = client.database(database);
        db.run_command(doc! { "ping": 1 })
            .await
            .context("MongoDB ping failed")?;

        Ok(Self { db })
    }

    fn collection(&self, name: &str) -> mongodb::Collection<Document> {
        self.db.collection::<Document>(name)
    }
}

fn to_document(value: Value) -> Result<Document> {
    match Bson::try_from(value).context("value is not valid extended JSON")? {
        Bson::Document(doc) => Ok(doc),
        other => bail!("expected a document, got {:?}", other.element_type()),
    }
}

fn to_json(doc: Document) -> Value {
    Bson::Document(doc).into_relaxed_extjson()
}

#[async_trait]
impl DocumentStore for MongoStore {
    fn backend_name(&self) -> &str {
        "mongodb"
    }

    async fn find(&self, collection: &str, filter: &Map<String, Value>) -> Result<Vec<Value>> {
        let filter = to_document(Value::Object(filter.clone()))?;
        let cursor = self.collection(collection).find(filter).await?;
        let docs: Vec<Document> = cursor.try_collect().await?;
        Ok(docs.into_iter().map(to_json).collect())
    }

    async fn aggregate(&self, collection: &str, pipeline: &[Value]) -> Result<Vec<Value>> {
        let stages = pipeline
            .iter()
            .cloned()
            .map(to_document)
            .collect::<Result<Vec<_>>>()?;
        let cursor = self.collection(collection).aggregate(stages).await?;
        let docs: Vec<Document> = cursor.try_collect().await?;
        Ok(docs.into_iter().map(to_json).collect())
    }

    async fn insert_many(&self, collection: &str, documents: &[Value]) -> Result<u64> {
        if documents.is_empty() {
            return Ok(0);
        }
        let docs = documents
            .iter()
            .cloned()
            .map(to_document)
            .collect::<Result<Vec<_>>>()?;
        let result = self.collection(collection).insert_many(docs).await?;
        Ok(result.inserted_ids.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_filter_converts_extended_json_dates() {
        let doc = to_document(json!({
            "organization_name": "Acme",
            "timestamp": {"$gte": {"$date": "2024-01-01T00:00:00Z"}}
        }))
        .unwrap();
        let range = doc.get_document("timestamp").unwrap();
        assert!(matches!(range.get("$gte"), Some(Bson::DateTime(_))));
    }

    #[test]
    fn test_scalar_is_not_a_document() {
        assert!(to_document(json!(5)).is_err());
    }

    #[test]
    fn test_result_uses_relaxed_extended_json() {
        let doc = doc! { "n": 3_i32, "name": "Acme" };
        assert_eq!(to_json(doc), json!({"n": 3, "name": "Acme"}));
    }
}
