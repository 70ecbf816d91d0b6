//! The chat-query request handler.
//!
//! One call walks a linear state machine:
//!
//! ```text
//! ValidatingMethod ─▶ ParsingBody ─▶ DecidingClarification ─┬─▶ ReturningClarification
//!                                                           └─▶ GeneratingQueryPlan
//!   ─▶ CheckingFilter ─▶ ExecutingQuery ─▶ SummarizingResults ─▶ ReturningResult
//! ```
//!
//! Any failure ends the request with a [`HandlerError`]. The one
//! exception is an unparseable clarification reply: that takes the
//! [`ClarificationGate::Unstructured`] branch and the request continues
//! as if no clarification were needed. No partial result is returned
//! once the clarification gate has passed.

use anyhow::Result;
use axum::http::Method;
use serde_json::{json, Value};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use chat_query_core::llm::LanguageModel;
use chat_query_core::models::{
    ChatRequest, ChatResponse, ClarificationDecision, InsightsReport, QueryPlan, QueryResponse,
    ResponseShape,
};
use chat_query_core::parse::{self, ParseError};
use chat_query_core::policy::FilterPolicy;
use chat_query_core::prompts;
use chat_query_core::query::project_fields;

use crate::cache::ConnectionCache;
use crate::config::Config;
use crate::error::HandlerError;
use crate::openai::OpenAIChatModel;
use crate::throttle::{Throttle, ThrottledModel};

/// Which model call failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelStage {
    Clarification,
    QueryPlan,
    Insights,
}

impl fmt::Display for ModelStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Clarification => "clarification",
            Self::QueryPlan => "query plan",
            Self::Insights => "insights",
        };
        f.write_str(s)
    }
}

/// Outcome of the clarification gate.
#[derive(Debug)]
pub enum ClarificationGate {
    /// Ask the caller these questions; the store is not touched.
    NeedsClarification(ClarificationDecision),
    Answerable,
    /// The reply was not structured data. Treated as answerable: the
    /// gate is lenient on purpose and never fails a request by itself.
    Unstructured(ParseError),
}

/// A successful reply from [`RequestHandler::handle`].
#[derive(Debug)]
pub enum Reply {
    /// `OPTIONS`: CORS headers, empty body.
    Preflight,
    Json(ChatResponse),
}

#[derive(Debug, Clone)]
pub struct HandlerOptions {
    pub collection: String,
    pub response_shape: ResponseShape,
    /// `None` runs model filters unchecked.
    pub filter_policy: Option<FilterPolicy>,
    /// Schema-based access when non-empty: results keep only these fields.
    pub schema_fields: Vec<String>,
}

impl HandlerOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            collection: config.store.collection.clone(),
            response_shape: config.handler.response_shape,
            filter_policy: config
                .handler
                .validate_filter
                .then(|| FilterPolicy::with_max_depth(config.handler.max_filter_depth)),
            schema_fields: config.store.schema_fields.clone(),
        }
    }
}

impl Default for HandlerOptions {
    fn default() -> Self {
        Self {
            collection: "events".to_string(),
            response_shape: ResponseShape::Full,
            filter_policy: Some(FilterPolicy::default()),
            schema_fields: Vec::new(),
        }
    }
}

pub struct RequestHandler {
    model: Arc<dyn LanguageModel>,
    stores: Arc<ConnectionCache>,
    options: HandlerOptions,
}

impl RequestHandler {
    pub fn new(
        model: Arc<dyn LanguageModel>,
        stores: Arc<ConnectionCache>,
        options: HandlerOptions,
    ) -> Self {
        Self {
            model,
            stores,
            options,
        }
    }

    /// Build the production handler: OpenAI model (throttled when
    /// `llm.min_interval_ms > 0`) and a lazily connecting store cache.
    ///
    /// Fails when the model API key is missing. The store connection
    /// string is only checked on first use.
    pub fn from_config(config: &Config) -> Result<Self> {
        let openai: Arc<dyn LanguageModel> = Arc::new(OpenAIChatModel::new(&config.llm)?);
        let model: Arc<dyn LanguageModel> = if config.llm.min_interval_ms > 0 {
            let throttle = Arc::new(Throttle::new(Duration::from_millis(
                config.llm.min_interval_ms,
            )));
            Arc::new(ThrottledModel::new(openai, throttle))
        } else {
            openai
        };
        let stores = Arc::new(ConnectionCache::new(config.store.clone()));
        Ok(Self::new(model, stores, HandlerOptions::from_config(config)))
    }

    pub fn stores(&self) -> &Arc<ConnectionCache> {
        &self.stores
    }

    /// Handle one HTTP call given its method and raw body.
    pub async fn handle(&self, method: &Method, body: &[u8]) -> Result<Reply, HandlerError> {
        if method == Method::OPTIONS {
            return Ok(Reply::Preflight);
        }
        if method != Method::POST {
            return Err(HandlerError::MethodNotAllowed);
        }
        let message = parse_body(body)?;
        self.run(&message).await.map(Reply::Json)
    }

    /// Run the pipeline for an already validated message.
    pub async fn run(&self, message: &str) -> Result<ChatResponse, HandlerError> {
        debug!(stage = "deciding_clarification");
        match self.decide_clarification(message).await? {
            ClarificationGate::NeedsClarification(decision) => {
                info!(
                    questions = decision.questions.len(),
                    "question needs clarification"
                );
                return Ok(ChatResponse::Clarification(decision.into()));
            }
            ClarificationGate::Answerable => {}
            ClarificationGate::Unstructured(err) => {
                warn!(error = %err, "clarification reply was not structured; proceeding to query generation");
            }
        }

        debug!(stage = "generating_query_plan");
        let plan = self.generate_plan(message).await?;
        self.check_plan(&plan)?;

        debug!(stage = "executing_query", aggregation = plan.is_aggregation());
        let data = self.execute(&plan).await?;
        info!(documents = data.len(), "query executed");

        debug!(stage = "summarizing_results");
        let report = self.summarize(message, &data).await?;

        Ok(ChatResponse::Result(QueryResponse::assemble(
            self.options.response_shape,
            data,
            plan,
            report,
        )))
    }

    async fn ask(&self, stage: ModelStage, system: &str, user: &str) -> Result<String, HandlerError> {
        self.model
            .complete(system, user)
            .await
            .map_err(|e| HandlerError::Model {
                stage,
                message: format!("{:#}", e),
            })
    }

    pub async fn decide_clarification(&self, message: &str) -> Result<ClarificationGate, HandlerError> {
        let reply = self
            .ask(ModelStage::Clarification, prompts::CLARIFICATION_SYSTEM, message)
            .await?;
        Ok(match parse::parse_clarification(&reply) {
            Ok(decision) if decision.needs_clarification => {
                ClarificationGate::NeedsClarification(decision)
            }
            Ok(_) => ClarificationGate::Answerable,
            Err(err) => ClarificationGate::Unstructured(err),
        })
    }

    async fn generate_plan(&self, message: &str) -> Result<QueryPlan, HandlerError> {
        let reply = self
            .ask(ModelStage::QueryPlan, prompts::QUERY_PLAN_SYSTEM, message)
            .await?;
        parse::parse_plan(&reply).map_err(HandlerError::PlanParse)
    }

    fn check_plan(&self, plan: &QueryPlan) -> Result<(), HandlerError> {
        let Some(policy) = &self.options.filter_policy else {
            return Ok(());
        };
        let checked = if plan.is_aggregation() {
            policy.check_pipeline(&plan.effective_pipeline())
        } else {
            policy.check_filter(&plan.query)
        };
        checked.map_err(|violation| {
            warn!(%violation, "model-generated query rejected");
            HandlerError::from(violation)
        })
    }

    async fn execute(&self, plan: &QueryPlan) -> Result<Vec<Value>, HandlerError> {
        let store = self.stores.get_store().await?;
        let collection = &self.options.collection;

        let result = if plan.is_aggregation() {
            store.aggregate(collection, &plan.effective_pipeline()).await
        } else {
            store.find(collection, &plan.query).await
        };
        let docs = result.map_err(|e| HandlerError::StoreQuery(format!("{:#}", e)))?;

        if plan.is_aggregation() || self.options.schema_fields.is_empty() {
            return Ok(docs);
        }
        Ok(docs
            .iter()
            .map(|d| project_fields(d, &self.options.schema_fields))
            .collect())
    }

    async fn summarize(&self, message: &str, data: &[Value]) -> Result<InsightsReport, HandlerError> {
        let payload = json!({ "query": message, "data": data }).to_string();
        let reply = self
            .ask(ModelStage::Insights, prompts::INSIGHTS_SYSTEM, &payload)
            .await?;
        parse::parse_insights(&reply).map_err(HandlerError::InsightsParse)
    }
}

/// Decode the request body and extract a non-blank `message`.
///
/// The body must be a JSON object. An empty body counts as a missing
/// message.
pub fn parse_body(body: &[u8]) -> Result<String, HandlerError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(HandlerError::MissingMessage);
    }
    let value: Value = serde_json::from_slice(body)
        .map_err(|e| HandlerError::MalformedRequest(e.to_string()))?;
    if !value.is_object() {
        return Err(HandlerError::MalformedRequest(
            "request body must be a JSON object".to_string(),
        ));
    }
    let request: ChatRequest = serde_json::from_value(value)
        .map_err(|e| HandlerError::MalformedRequest(e.to_string()))?;
    request
        .message()
        .map(str::to_string)
        .ok_or(HandlerError::MissingMessage)
}
