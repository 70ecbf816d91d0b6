//! Language-model abstraction.
//!
//! The pipeline treats the model as an opaque text-completion service:
//! one system instruction and one user turn in, one text reply out.

use anyhow::Result;
use async_trait::async_trait;

/// A chat-completion backend.
///
/// Implementations must be `Send + Sync` so a single client can be shared
/// across concurrent requests.
///
/// # Example
///
/// ```rust
/// use async_trait::async_trait;
/// use anyhow::Result;
/// use chat_query_core::llm::LanguageModel;
///
/// struct Echo;
///
/// #[async_trait]
/// impl LanguageModel for Echo {
///     fn model_name(&self) -> &str { "echo" }
///
///     async fn complete(&self, _system: &str, user: &str) -> Result<String> {
///         Ok(user.to_string())
///     }
/// }
/// ```
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Model identifier, used in logs.
    fn model_name(&self) -> &str;

    /// Send one system instruction and one user message; return the reply text.
    async fn complete(&self, system: &str, user: &str) -> Result<String>;
}
