//! TOML configuration.
//!
//! Every section and field has a default, so an absent or empty file
//! yields a runnable configuration. Secrets are never stored here by
//! default: the store connection string and the model API key are read
//! from the environment variables named in `store.uri_env` and
//! `llm.api_key_env`.
//!
//! ```toml
//! [server]
//! bind = "127.0.0.1:8888"
//! path = "/chat-query"
//!
//! [store]
//! uri_env = ["MONGODB_URI", "MONGO_URI", "DATABASE_URL"]
//! database = "analytics"
//! collection = "events"
//! schema_fields = ["organization_name", "event_type", "timestamp"]
//!
//! [llm]
//! model = "gpt-4"
//! min_interval_ms = 0
//!
//! [handler]
//! response_shape = "full"   # or "insightsOnly"
//! validate_filter = true
//! ```

use anyhow::{bail, Context, Result};
use chat_query_core::models::ResponseShape;
use serde::Deserialize;
use std::path::Path;

use crate::db::StoreScheme;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub handler: HandlerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Route of the chat-query endpoint.
    #[serde(default = "default_path")]
    pub path: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            path: default_path(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8888".to_string()
}
fn default_path() -> String {
    "/chat-query".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    /// Explicit connection string. Takes precedence over `uri_env`.
    #[serde(default)]
    pub uri: Option<String>,
    /// Environment variables checked in order for the connection string.
    #[serde(default = "default_uri_env")]
    pub uri_env: Vec<String>,
    #[serde(default = "default_database")]
    pub database: String,
    #[serde(default = "default_collection")]
    pub collection: String,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// When non-empty, results keep only `_id` and these fields.
    #[serde(default)]
    pub schema_fields: Vec<String>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            uri: None,
            uri_env: default_uri_env(),
            database: default_database(),
            collection: default_collection(),
            connect_timeout_secs: default_connect_timeout_secs(),
            schema_fields: Vec::new(),
        }
    }
}

fn default_uri_env() -> Vec<String> {
    vec![
        "MONGODB_URI".to_string(),
        "MONGO_URI".to_string(),
        "DATABASE_URL".to_string(),
    ]
}
fn default_database() -> String {
    "analytics".to_string()
}
fn default_collection() -> String {
    "events".to_string()
}
fn default_connect_timeout_secs() -> u64 {
    10
}

impl StoreConfig {
    /// The configured connection string, or the first non-blank
    /// environment variable from `uri_env`.
    pub fn connection_string(&self) -> Option<String> {
        if let Some(uri) = self.uri.as_deref().map(str::trim).filter(|u| !u.is_empty()) {
            return Some(uri.to_string());
        }
        self.uri_env
            .iter()
            .filter_map(|name| std::env::var(name).ok())
            .map(|v| v.trim().to_string())
            .find(|v| !v.is_empty())
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
    /// Minimum gap between successive model calls, process-wide. 0 disables.
    #[serde(default)]
    pub min_interval_ms: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            base_url: default_base_url(),
            api_key_env: default_api_key_env(),
            timeout_secs: default_llm_timeout_secs(),
            min_interval_ms: 0,
        }
    }
}

fn default_model() -> String {
    "gpt-4".to_string()
}
fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}
fn default_llm_timeout_secs() -> u64 {
    60
}

impl LlmConfig {
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env)
            .ok()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct HandlerConfig {
    #[serde(default)]
    pub response_shape: ResponseShape,
    /// Check model-generated filters against the operator allow-list.
    #[serde(default = "default_validate_filter")]
    pub validate_filter: bool,
    #[serde(default = "default_max_filter_depth")]
    pub max_filter_depth: usize,
}

impl Default for HandlerConfig {
    fn default() -> Self {
        Self {
            response_shape: ResponseShape::default(),
            validate_filter: default_validate_filter(),
            max_filter_depth: default_max_filter_depth(),
        }
    }
}

fn default_validate_filter() -> bool {
    true
}
fn default_max_filter_depth() -> usize {
    chat_query_core::policy::DEFAULT_MAX_DEPTH
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if !self.server.path.starts_with('/') {
            bail!("server.path must start with '/'");
        }
        if self.server.path == "/health" {
            bail!("server.path must not shadow /health");
        }
        if self.store.database.trim().is_empty() {
            bail!("store.database must not be empty");
        }
        if self.store.collection.trim().is_empty() {
            bail!("store.collection must not be empty");
        }
        if self.store.connect_timeout_secs == 0 {
            bail!("store.connect_timeout_secs must be > 0");
        }
        if let Some(uri) = self.store.uri.as_deref().filter(|u| !u.trim().is_empty()) {
            if StoreScheme::detect(uri).is_none() {
                bail!("store.uri must start with mongodb://, mongodb+srv:// or sqlite:");
            }
        }
        if self.llm.model.trim().is_empty() {
            bail!("llm.model must not be empty");
        }
        if self.llm.timeout_secs == 0 {
            bail!("llm.timeout_secs must be > 0");
        }
        if self.handler.max_filter_depth == 0 {
            bail!("handler.max_filter_depth must be >= 1");
        }
        Ok(())
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    config.validate()?;
    Ok(config)
}

/// Load `path` if it exists; otherwise validated defaults.
pub fn load_or_default(path: &Path) -> Result<Config> {
    if path.exists() {
        load_config(path)
    } else {
        let config = Config::default();
        config.validate()?;
        Ok(config)
    }
}
