//! Request-level error taxonomy and its HTTP mapping.
//!
//! Client mistakes (`MalformedRequest`, `MissingMessage`,
//! `MethodNotAllowed`) map to 4xx with a short `error` string. Everything
//! else maps to 500 with `{"error": "Internal Server Error", "details":
//! <message>}`. The details carry the underlying message verbatim as a
//! debugging aid.

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chat_query_core::parse::ParseError;
use chat_query_core::policy::PolicyViolation;
use serde::Serialize;
use thiserror::Error;

use crate::handler::ModelStage;

#[derive(Debug, Error)]
pub enum HandlerError {
    /// Missing or malformed connection string or credential.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The document store could not be reached.
    #[error("failed to connect to document store: {0}")]
    Connection(String),

    #[error("invalid request body: {0}")]
    MalformedRequest(String),

    #[error("Message is required")]
    MissingMessage,

    #[error("Method Not Allowed")]
    MethodNotAllowed,

    /// The model API call itself failed (network, non-2xx, bad envelope).
    #[error("language model call failed during {stage}: {message}")]
    Model { stage: ModelStage, message: String },

    #[error("failed to parse query plan: {0}")]
    PlanParse(#[source] ParseError),

    #[error("failed to parse insights: {0}")]
    InsightsParse(#[source] ParseError),

    #[error("query filter rejected: {0}")]
    RejectedFilter(#[from] PolicyViolation),

    #[error("store query failed: {0}")]
    StoreQuery(String),
}

impl HandlerError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::MalformedRequest(_) | Self::MissingMessage => StatusCode::BAD_REQUEST,
            Self::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Machine-readable kind, used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "configuration",
            Self::Connection(_) => "connection",
            Self::MalformedRequest(_) => "malformed_request",
            Self::MissingMessage => "missing_message",
            Self::MethodNotAllowed => "method_not_allowed",
            Self::Model { .. } => "model",
            Self::PlanParse(_) => "plan_parse",
            Self::InsightsParse(_) => "insights_parse",
            Self::RejectedFilter(_) => "rejected_filter",
            Self::StoreQuery(_) => "store_query",
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for HandlerError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            Self::MissingMessage | Self::MethodNotAllowed => ErrorBody {
                error: self.to_string(),
                details: None,
            },
            Self::MalformedRequest(reason) => ErrorBody {
                error: "Invalid request body".to_string(),
                details: Some(reason.clone()),
            },
            _ => ErrorBody {
                error: "Internal Server Error".to_string(),
                details: Some(self.to_string()),
            },
        };
        (
            status,
            [(header::ACCESS_CONTROL_ALLOW_ORIGIN, "*")],
            Json(body),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(HandlerError::MissingMessage.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            HandlerError::MalformedRequest("x".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            HandlerError::MethodNotAllowed.status(),
            StatusCode::METHOD_NOT_ALLOWED
        );
        assert_eq!(
            HandlerError::StoreQuery("boom".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            HandlerError::Configuration("x".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_literal_client_messages() {
        assert_eq!(HandlerError::MissingMessage.to_string(), "Message is required");
        assert_eq!(HandlerError::MethodNotAllowed.to_string(), "Method Not Allowed");
    }

    #[test]
    fn test_server_error_details_carry_cause() {
        let err = HandlerError::StoreQuery("connection reset by peer".into());
        assert!(err.to_string().contains("connection reset by peer"));
        assert_eq!(err.kind(), "store_query");
    }

    #[test]
    fn test_policy_violation_converts() {
        let err: HandlerError = PolicyViolation::Operator("$where".into()).into();
        assert!(matches!(err, HandlerError::RejectedFilter(_)));
        assert!(err.to_string().contains("$where"));
    }
}
