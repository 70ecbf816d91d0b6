//! Data types flowing through the chat-query pipeline.
//!
//! Inbound: [`ChatRequest`]. Intermediate model judgments:
//! [`ClarificationDecision`], [`QueryPlan`], [`InsightsReport`].
//! Outbound: [`ChatResponse`], shaped by [`ResponseShape`].

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Body of `POST` to the chat-query endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub message: Option<String>,
}

impl ChatRequest {
    /// The trimmed message, or `None` when absent or blank.
    pub fn message(&self) -> Option<&str> {
        self.message
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
    }
}

/// The model's judgment on whether the question is answerable as-is.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClarificationDecision {
    #[serde(default)]
    pub needs_clarification: bool,
    #[serde(default)]
    pub questions: Vec<String>,
    #[serde(default)]
    pub suggestions: Vec<String>,
}

/// The model's translation of a question into a store query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryPlan {
    /// Filter document passed to `find`.
    pub query: Map<String, Value>,
    pub explanation: String,
    /// Aggregation pipeline. When non-empty the plan runs as `aggregate`,
    /// with a non-empty `query` as its leading `$match`.
    pub pipeline: Vec<Value>,
}

impl QueryPlan {
    pub fn is_aggregation(&self) -> bool {
        !self.pipeline.is_empty()
    }

    /// The pipeline sent to the store: `{"$match": query}` first when the
    /// filter is non-empty, then the model's stages.
    pub fn effective_pipeline(&self) -> Vec<Value> {
        let lead = (!self.query.is_empty())
            .then(|| serde_json::json!({ "$match": Value::Object(self.query.clone()) }));
        lead.into_iter()
            .chain(self.pipeline.iter().cloned())
            .collect()
    }
}

/// Final structured digest derived from the query results.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ManagerSummary {
    #[serde(default)]
    pub key_metrics: Vec<String>,
    #[serde(default)]
    pub recommendations: Vec<String>,
    #[serde(default)]
    pub trends: Vec<String>,
}

/// The model's summary of the query results.
#[derive(Debug, Clone, PartialEq)]
pub struct InsightsReport {
    /// The model's object as returned, echoed to the caller.
    pub insights: Value,
    pub summary: ManagerSummary,
}

/// Which fields the final result carries.
///
/// `Full` returns the raw documents alongside the insights;
/// `InsightsOnly` drops `data` from the payload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ResponseShape {
    #[default]
    Full,
    #[serde(alias = "insights_only")]
    InsightsOnly,
}

/// Response when the clarification gate fires.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClarificationResponse {
    pub needs_clarification: bool,
    pub questions: Vec<String>,
    pub suggestions: Vec<String>,
}

impl From<ClarificationDecision> for ClarificationResponse {
    fn from(decision: ClarificationDecision) -> Self {
        Self {
            needs_clarification: true,
            questions: decision.questions,
            suggestions: decision.suggestions,
        }
    }
}

/// Response after the query ran and was summarized.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Vec<Value>>,
    pub explanation: String,
    pub insights: Value,
    pub manager_summary: ManagerSummary,
}

impl QueryResponse {
    pub fn assemble(
        shape: ResponseShape,
        data: Vec<Value>,
        plan: QueryPlan,
        report: InsightsReport,
    ) -> Self {
        let data = match shape {
            ResponseShape::Full => Some(data),
            ResponseShape::InsightsOnly => None,
        };
        Self {
            data,
            explanation: plan.explanation,
            insights: report.insights,
            manager_summary: report.summary,
        }
    }
}

/// A successful pipeline outcome. Serializes to the bare inner object.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ChatResponse {
    Clarification(ClarificationResponse),
    Result(QueryResponse),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_message_is_trimmed_and_blank_is_none() {
        let req: ChatRequest = serde_json::from_value(json!({ "message": "  hi  " })).unwrap();
        assert_eq!(req.message(), Some("hi"));

        let req: ChatRequest = serde_json::from_value(json!({ "message": "   " })).unwrap();
        assert_eq!(req.message(), None);

        let req: ChatRequest = serde_json::from_value(json!({})).unwrap();
        assert_eq!(req.message(), None);
    }

    #[test]
    fn test_clarification_response_serializes_camel_case() {
        let resp = ChatResponse::Clarification(
            ClarificationDecision {
                needs_clarification: true,
                questions: vec!["Which region?".into()],
                suggestions: vec![],
            }
            .into(),
        );
        let v = serde_json::to_value(&resp).unwrap();
        assert_eq!(
            v,
            json!({ "needsClarification": true, "questions": ["Which region?"], "suggestions": [] })
        );
    }

    #[test]
    fn test_effective_pipeline_leads_with_query() {
        let plan = QueryPlan {
            query: json!({"organization_name": "Acme"}).as_object().unwrap().clone(),
            explanation: String::new(),
            pipeline: vec![json!({"$count": "n"})],
        };
        assert_eq!(
            plan.effective_pipeline(),
            vec![json!({"$match": {"organization_name": "Acme"}}), json!({"$count": "n"})]
        );

        let bare = QueryPlan {
            pipeline: vec![json!({"$count": "n"})],
            ..Default::default()
        };
        assert_eq!(bare.effective_pipeline(), vec![json!({"$count": "n"})]);
    }

    #[test]
    fn test_insights_only_shape_omits_data() {
        let plan = QueryPlan {
            explanation: "all events".into(),
            ..Default::default()
        };
        let report = InsightsReport {
            insights: json!({ "trends": ["up"] }),
            summary: ManagerSummary {
                trends: vec!["up".into()],
                ..Default::default()
            },
        };
        let resp = QueryResponse::assemble(
            ResponseShape::InsightsOnly,
            vec![json!({ "a": 1 })],
            plan,
            report,
        );
        let v = serde_json::to_value(&resp).unwrap();
        assert!(v.get("data").is_none());
        assert_eq!(v["managerSummary"]["trends"], json!(["up"]));
        assert_eq!(v["managerSummary"]["keyMetrics"], json!([]));
    }

    #[test]
    fn test_response_shape_accepts_both_spellings() {
        let a: ResponseShape = serde_json::from_value(json!("insightsOnly")).unwrap();
        let b: ResponseShape = serde_json::from_value(json!("insights_only")).unwrap();
        assert_eq!(a, ResponseShape::InsightsOnly);
        assert_eq!(b, ResponseShape::InsightsOnly);
    }
}
