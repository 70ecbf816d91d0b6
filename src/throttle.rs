//! Process-wide minimum gap between language-model calls.
//!
//! This is a soft rate limit, not a queue with fairness guarantees:
//! callers wait on a FIFO `tokio::sync::Mutex`, so they are released in
//! call order, each at least `min_interval` after the previous one.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

use chat_query_core::llm::LanguageModel;

pub struct Throttle {
    min_interval: Duration,
    last_call: Mutex<Option<Instant>>,
}

impl Throttle {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_call: Mutex::new(None),
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Suspend until the gap since the previous call has elapsed, then
    /// claim the current instant as the latest call.
    pub async fn wait(&self) {
        if self.min_interval.is_zero() {
            return;
        }
        let mut last = self.last_call.lock().await;
        if let Some(prev) = *last {
            let elapsed = prev.elapsed();
            if elapsed < self.min_interval {
                let delay = self.min_interval - elapsed;
                tracing::debug!(delay_ms = delay.as_millis() as u64, "throttling model call");
                tokio::time::sleep(delay).await;
            }
        }
        *last = Some(Instant::now());
    }
}

/// A [`LanguageModel`] that waits on a shared [`Throttle`] before each call.
pub struct ThrottledModel {
    inner: Arc<dyn LanguageModel>,
    throttle: Arc<Throttle>,
}

impl ThrottledModel {
    pub fn new(inner: Arc<dyn LanguageModel>, throttle: Arc<Throttle>) -> Self {
        Self { inner, throttle }
    }
}

#[async_trait]
impl LanguageModel for ThrottledModel {
    fn model_name(&self) -> &str {
        self.inner.model_name()
    }

    async fn complete(&self, system: &str, user: &str) -> Result<String> {
        self.throttle.wait().await;
        self.inner.complete(system, user).await
    }
}
