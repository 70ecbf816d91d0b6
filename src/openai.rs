//! OpenAI chat-completions client.
//!
//! Calls `POST {base_url}/chat/completions` with one system and one user
//! message and returns `choices[0].message.content`. There is no retry:
//! a failed call fails the request.

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;

use chat_query_core::llm::LanguageModel;

use crate::config::LlmConfig;

pub struct OpenAIChatModel {
    client: reqwest::Client,
    model: String,
    base_url: String,
    api_key: String,
}

impl OpenAIChatModel {
    /// Create a client reading the API key from `config.api_key_env`.
    ///
    /// # Errors
    ///
    /// Returns an error if the environment variable is unset or blank.
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let api_key = config
            .api_key()
            .ok_or_else(|| anyhow!("{} environment variable not set", config.api_key_env))?;
        Self::with_api_key(config, api_key)
    }

    pub fn with_api_key(config: &LlmConfig, api_key: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            model: config.model.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }
}

#[async_trait]
impl LanguageModel for OpenAIChatModel {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, system: &str, user: &str) -> Result<String> {
        let body = json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": user },
            ],
        });

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .context("OpenAI request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            bail!("OpenAI API error {}: {}", status, body_text);
        }

        let json: Value = response.json().await?;
        parse_chat_response(&json)
    }
}

/// Extract `choices[0].message.content` from a chat-completions response.
fn parse_chat_response(json: &Value) -> Result<String> {
    json.get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .map(str::to_string)
        .ok_or_else(|| anyhow!("Invalid OpenAI response: missing choices[0].message.content"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_chat_response() {
        let json = json!({
            "choices": [{ "index": 0, "message": { "role": "assistant", "content": "{\"a\":1}" } }]
        });
        assert_eq!(parse_chat_response(&json).unwrap(), "{\"a\":1}");
    }

    #[test]
    fn test_parse_chat_response_missing_content() {
        assert!(parse_chat_response(&json!({ "choices": [] })).is_err());
        assert!(parse_chat_response(&json!({ "choices": [{ "message": { "content": null } }] })).is_err());
    }

    #[test]
    fn test_missing_key_env_is_an_error() {
        let config = LlmConfig {
            api_key_env: "CHAT_QUERY_TEST_KEY_NEVER_SET".into(),
            ..Default::default()
        };
        let err = OpenAIChatModel::new(&config).err().unwrap();
        assert!(err.to_string().contains("CHAT_QUERY_TEST_KEY_NEVER_SET"));
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let config = LlmConfig {
            base_url: "http://localhost:9999/v1/".into(),
            ..Default::default()
        };
        let model = OpenAIChatModel::with_api_key(&config, "k").unwrap();
        assert_eq!(model.base_url, "http://localhost:9999/v1");
        assert_eq!(model.model_name(), "gpt-4");
    }
}
