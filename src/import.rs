//! `chat-query import`: seed a collection from a JSON file.
//!
//! Accepts either a JSON array of objects or JSON Lines (one object per
//! line, blank lines ignored). Useful for loading fixture data into a
//! local SQLite store before trying questions against it.

use anyhow::{bail, Context, Result};
use serde_json::Value;
use std::path::Path;
use tracing::info;

use crate::cache::ConnectionCache;
use crate::config::Config;

/// Parse `text` as a JSON array or as JSON Lines.
pub fn parse_documents(text: &str) -> Result<Vec<Value>> {
    let trimmed = text.trim_start();
    let docs: Vec<Value> = if trimmed.starts_with('[') {
        serde_json::from_str(trimmed).context("invalid JSON array")?
    } else {
        trimmed
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(i, line)| {
                serde_json::from_str(line).with_context(|| format!("invalid JSON on line {}", i + 1))
            })
            .collect::<Result<_>>()?
    };

    if let Some(pos) = docs.iter().position(|d| !d.is_object()) {
        bail!("document {} is not a JSON object", pos + 1);
    }
    Ok(docs)
}

/// Insert every document in `path` into `collection` (default
/// `[store].collection`). Returns the number inserted.
pub async fn run_import(config: &Config, path: &Path, collection: Option<&str>) -> Result<u64> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let docs = parse_documents(&text)?;
    let collection = collection.unwrap_or(&config.store.collection);

    let cache = ConnectionCache::new(config.store.clone());
    let store = cache.get_store().await?;
    let inserted = store.insert_many(collection, &docs).await?;

    info!(collection, inserted, backend = store.backend_name(), "import complete");
    Ok(inserted)
}
