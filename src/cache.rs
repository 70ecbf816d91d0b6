//! Process-wide cached document-store handle.
//!
//! The first [`ConnectionCache::get_store`] call resolves the connection
//! string, connects, and stores the handle in a `tokio::sync::OnceCell`.
//! Every later call in the same process returns that handle. Concurrent
//! first callers wait for the single in-flight connect. A failed connect
//! leaves the cell empty, so the next request tries again. There is no
//! explicit teardown; the handle lives as long as the process.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{error, info};

use chat_query_core::store::DocumentStore;

use crate::config::StoreConfig;
use crate::db::{self, redact, StoreScheme};
use crate::error::HandlerError;

/// Opens a store for a validated connection string.
#[async_trait]
pub trait StoreConnector: Send + Sync {
    async fn connect(&self, uri: &str) -> Result<Arc<dyn DocumentStore>>;
}

/// Default connector: picks MongoDB or SQLite from the URI scheme.
pub struct UriConnector {
    config: StoreConfig,
}

impl UriConnector {
    pub fn new(config: StoreConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl StoreConnector for UriConnector {
    async fn connect(&self, uri: &str) -> Result<Arc<dyn DocumentStore>> {
        db::connect(uri, &self.config).await
    }
}

pub struct ConnectionCache {
    config: StoreConfig,
    connector: Arc<dyn StoreConnector>,
    cell: OnceCell<Arc<dyn DocumentStore>>,
}

impl ConnectionCache {
    pub fn new(config: StoreConfig) -> Self {
        let connector = Arc::new(UriConnector::new(config.clone()));
        Self::with_connector(config, connector)
    }

    pub fn with_connector(config: StoreConfig, connector: Arc<dyn StoreConnector>) -> Self {
        Self {
            config,
            connector,
            cell: OnceCell::new(),
        }
    }

    /// A cache that already holds `store`; no connect ever happens.
    pub fn preconnected(config: StoreConfig, store: Arc<dyn DocumentStore>) -> Self {
        Self {
            connector: Arc::new(UriConnector::new(config.clone())),
            config,
            cell: OnceCell::new_with(Some(store)),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.cell.initialized()
    }

    pub async fn get_store(&self) -> Result<Arc<dyn DocumentStore>, HandlerError> {
        self.cell
            .get_or_try_init(|| self.establish())
            .await
            .cloned()
    }

    async fn establish(&self) -> Result<Arc<dyn DocumentStore>, HandlerError> {
        let uri = self.resolve_uri().inspect_err(|e| {
            error!(error = %e, "document store configuration invalid");
        })?;

        let secs = self.config.connect_timeout_secs;
        let outcome = tokio::time::timeout(Duration::from_secs(secs), self.connector.connect(&uri))
            .await;

        match outcome {
            Ok(Ok(store)) => {
                info!(
                    backend = store.backend_name(),
                    uri = %redact(&uri),
                    database = %self.config.database,
                    "document store connected"
                );
                Ok(store)
            }
            Ok(Err(e)) => {
                let message = format!("{:#}", e);
                error!(uri = %redact(&uri), error = %message, "document store connection failed");
                Err(HandlerError::Connection(message))
            }
            Err(_) => {
                let message = format!("connect timed out after {}s", secs);
                error!(uri = %redact(&uri), error = %message, "document store connection failed");
                Err(HandlerError::Connection(message))
            }
        }
    }

    fn resolve_uri(&self) -> Result<String, HandlerError> {
        let uri = self.config.connection_string().ok_or_else(|| {
            HandlerError::Configuration(format!(
                "document store connection string is not set (store.uri or one of {})",
                self.config.uri_env.join(", ")
            ))
        })?;
        if StoreScheme::detect(&uri).is_none() {
            return Err(HandlerError::Configuration(format!(
                "unsupported connection string scheme: {}",
                redact(&uri)
            )));
        }
        Ok(uri)
    }
}
