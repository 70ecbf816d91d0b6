//! Parsing of model replies into typed pipeline values.
//!
//! Models are asked for bare JSON but regularly wrap it in a Markdown
//! code fence or surround it with a sentence. [`extract_json`] strips
//! both before decoding.

use serde_json::{Map, Value};
use thiserror::Error;

use crate::models::{ClarificationDecision, InsightsReport, ManagerSummary, QueryPlan};

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("model returned an empty response")]
    Empty,
    #[error("model response is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("model response is not a JSON object")]
    NotAnObject,
    #[error("field `{field}` {reason}")]
    Field { field: &'static str, reason: String },
}

/// Returns the JSON payload embedded in a model reply.
///
/// Handles a surrounding ```` ```json ```` fence and leading or trailing
/// prose around a single top-level object.
pub fn extract_json(raw: &str) -> &str {
    let mut text = raw.trim();

    if let Some(rest) = text.strip_prefix("```") {
        // Drop the info string (e.g. `json`) on the opening fence line.
        text = match rest.find('\n') {
            Some(nl) => &rest[nl + 1..],
            None => rest,
        };
        text = text.trim_end();
        text = text.strip_suffix("```").unwrap_or(text).trim();
    }

    if text.starts_with('{') || text.starts_with('[') {
        return text;
    }

    match (text.find('{'), text.rfind('}')) {
        (Some(start), Some(end)) if start < end => &text[start..=end],
        _ => text,
    }
}

fn parse_object(raw: &str) -> Result<Map<String, Value>, ParseError> {
    let text = extract_json(raw);
    if text.is_empty() {
        return Err(ParseError::Empty);
    }
    match serde_json::from_str::<Value>(text)? {
        Value::Object(map) => Ok(map),
        _ => Err(ParseError::NotAnObject),
    }
}

/// Parse the clarification gate reply.
pub fn parse_clarification(raw: &str) -> Result<ClarificationDecision, ParseError> {
    let map = parse_object(raw)?;
    Ok(serde_json::from_value(Value::Object(map))?)
}

/// Parse the query translation reply.
///
/// `query` must be an object; absent or `null` means "match everything".
/// `pipeline`, when present, must be an array.
pub fn parse_plan(raw: &str) -> Result<QueryPlan, ParseError> {
    let mut map = parse_object(raw)?;

    let query = match map.remove("query") {
        None | Some(Value::Null) => Map::new(),
        Some(Value::Object(q)) => q,
        Some(other) => {
            return Err(ParseError::Field {
                field: "query",
                reason: format!("must be an object, got {}", type_name(&other)),
            })
        }
    };

    let explanation = match map.remove("explanation") {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s,
        Some(other) => other.to_string(),
    };

    let pipeline = match map.remove("pipeline") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(stages)) => stages,
        Some(other) => {
            return Err(ParseError::Field {
                field: "pipeline",
                reason: format!("must be an array, got {}", type_name(&other)),
            })
        }
    };

    Ok(QueryPlan {
        query,
        explanation,
        pipeline,
    })
}

/// Parse the insights reply.
///
/// The three summary arrays default to empty. Non-string entries are
/// kept as their JSON text so a model returning objects still produces a
/// readable summary.
pub fn parse_insights(raw: &str) -> Result<InsightsReport, ParseError> {
    let map = parse_object(raw)?;
    let summary = ManagerSummary {
        key_metrics: string_list(map.get("keyMetrics")),
        recommendations: string_list(map.get("recommendations")),
        trends: string_list(map.get("trends")),
    };
    Ok(InsightsReport {
        insights: Value::Object(map),
        summary,
    })
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| match item {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect(),
        Some(Value::String(s)) if !s.is_empty() => vec![s.clone()],
        _ => Vec::new(),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
