//! SQLite-backed [`DocumentStore`] for local development and tests.
//!
//! Documents are stored as JSON text in a single `documents` table keyed
//! by `(collection, doc_id)`. SQLite does no filtering: each query loads
//! the collection and evaluates the filter or pipeline with
//! [`chat_query_core::query`].

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde_json::{Map, Value};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::str::FromStr;

use chat_query_core::query::{apply_pipeline, matches};
use chat_query_core::store::DocumentStore;

pub struct SqliteDocumentStore {
    pool: SqlitePool,
}

impl SqliteDocumentStore {
    /// Open (creating if missing) the database at `uri` and ensure the
    /// schema exists.
    pub async fn connect(uri: &str) -> Result<Self> {
        let in_memory = uri.contains(":memory:") || uri.contains("mode=memory");

        let mut options = SqliteConnectOptions::from_str(uri)
            .with_context(|| format!("invalid SQLite connection string: {}", uri))?
            .create_if_missing(true);
        if !in_memory {
            options = options.journal_mode(SqliteJournalMode::Wal);
        }

        // Each in-memory connection is a separate database, so keep exactly one alive.
        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(5)
        };

        let pool = pool_options.connect_with(options).await?;
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                collection TEXT NOT NULL,
                doc_id TEXT NOT NULL,
                body TEXT NOT NULL,
                UNIQUE(collection, doc_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_documents_collection ON documents(collection)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn load(&self, collection: &str) -> Result<Vec<Value>> {
        let rows = sqlx::query("SELECT body FROM documents WHERE collection = ? ORDER BY id")
            .bind(collection)
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| {
                let body: String = row.get("body");
                serde_json::from_str(&body).context("corrupt document body")
            })
            .collect()
    }
}

fn doc_id(id: &Value) -> String {
    match id {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[async_trait]
impl DocumentStore for SqliteDocumentStore {
    fn backend_name(&self) -> &str {
        "sqlite"
    }

    async fn find(&self, collection: &str, filter: &Map<String, Value>) -> Result<Vec<Value>> {
        let docs = self.load(collection).await?;
        Ok(docs.into_iter().filter(|d| matches(d, filter)).collect())
    }

    async fn aggregate(&self, collection: &str, pipeline: &[Value]) -> Result<Vec<Value>> {
        let docs = self.load(collection).await?;
        Ok(apply_pipeline(docs, pipeline)?)
    }

    async fn insert_many(&self, collection: &str, documents: &[Value]) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        let mut inserted = 0u64;

        for doc in documents {
            let Value::Object(map) = doc else {
                bail!("documents must be JSON objects");
            };
            let mut map = map.clone();
            let id = match map.get("_id") {
                Some(id) => doc_id(id),
                None => {
                    let id = uuid::Uuid::new_v4().to_string();
                    map.insert("_id".into(), Value::String(id.clone()));
                    id
                }
            };
            let body = serde_json::to_string(&Value::Object(map))?;

            sqlx::query("INSERT INTO documents (collection, doc_id, body) VALUES (?, ?, ?)")
                .bind(collection)
                .bind(&id)
                .bind(&body)
                .execute(&mut *tx)
                .await
                .with_context(|| format!("failed to insert document {}", id))?;
            inserted += 1;
        }

        tx.commit().await?;
        Ok(inserted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn acme_events() -> Vec<Value> {
        vec![
            json!({"_id": "e1", "organization_name": "Acme", "event_type": "click"}),
            json!({"_id": "e2", "organization_name": "Acme", "event_type": "view"}),
            json!({"_id": "e3", "organization_name": "Globex", "event_type": "click"}),
        ]
    }

    #[tokio::test]
    async fn test_insert_and_find_in_memory() {
        let store = SqliteDocumentStore::connect("sqlite::memory:").await.unwrap();
        assert_eq!(store.insert_many("events", &acme_events()).await.unwrap(), 3);

        let filter = json!({"organization_name": "Acme"});
        let hits = store
            .find("events", filter.as_object().unwrap())
            .await
            .unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0]["_id"], json!("e1"));

        let other = store.find("signups", &Map::new()).await.unwrap();
        assert!(other.is_empty());
    }

    #[tokio::test]
    async fn test_aggregate() {
        let store = SqliteDocumentStore::connect("sqlite::memory:").await.unwrap();
        store.insert_many("events", &acme_events()).await.unwrap();
        let out = store
            .aggregate(
                "events",
                &[json!({"$match": {"event_type": "click"}}), json!({"$count": "clicks"})],
            )
            .await
            .unwrap();
        assert_eq!(out, vec![json!({"clicks": 2})]);
    }

    #[tokio::test]
    async fn test_documents_persist_across_connections() {
        let tmp = TempDir::new().unwrap();
        let uri = format!("sqlite:{}", tmp.path().join("events.sqlite").display());

        {
            let store = SqliteDocumentStore::connect(&uri).await.unwrap();
            store
                .insert_many("events", &[json!({"organization_name": "Acme"})])
                .await
                .unwrap();
        }

        let store = SqliteDocumentStore::connect(&uri).await.unwrap();
        let all = store.find("events", &Map::new()).await.unwrap();
        assert_eq!(all.len(), 1);
        assert!(all[0]["_id"].is_string());
    }

    #[tokio::test]
    async fn test_duplicate_id_fails_whole_batch() {
        let store = SqliteDocumentStore::connect("sqlite::memory:").await.unwrap();
        let batch = vec![json!({"_id": "dup"}), json!({"_id": "dup"})];
        assert!(store.insert_many("events", &batch).await.is_err());
        assert!(store.find("events", &Map::new()).await.unwrap().is_empty());
    }
}
