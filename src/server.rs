//! HTTP surface for the chat-query handler.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `[server].path` | Ask a question: `{"message": "..."}` |
//! | `OPTIONS` | `[server].path` | CORS preflight, empty body |
//! | `GET`  | `/health` | Health check (returns version and store state) |
//!
//! Any other method on the chat-query path returns `405`
//! `{"error": "Method Not Allowed"}`.
//!
//! # CORS
//!
//! Every JSON response carries `Access-Control-Allow-Origin: *`. The
//! preflight additionally allows `POST, OPTIONS` and the `Content-Type`
//! header.

use axum::{
    body::Bytes,
    extract::State,
    http::{header, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{any, get},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{error, info, info_span, warn, Instrument};

use crate::config::{Config, ServerConfig};
use crate::handler::{Reply, RequestHandler};

#[derive(Clone)]
struct AppState {
    handler: Arc<RequestHandler>,
}

/// Build the router without binding a socket.
pub fn router(path: &str, handler: Arc<RequestHandler>) -> Router {
    Router::new()
        .route("/health", get(handle_health))
        .route(path, any(handle_chat_query))
        .layer(TraceLayer::new_for_http())
        .with_state(AppState { handler })
}

/// Start the server using the production handler built from `config`.
///
/// Fails before binding when the model API key is missing.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let handler = Arc::new(RequestHandler::from_config(config)?);
    run_server_with_handler(&config.server, handler).await
}

/// Start the server with a caller-supplied handler. Runs until the
/// process is terminated.
pub async fn run_server_with_handler(
    server: &ServerConfig,
    handler: Arc<RequestHandler>,
) -> anyhow::Result<()> {
    let app = router(&server.path, handler);

    let listener = tokio::net::TcpListener::bind(&server.bind).await?;
    info!(bind = %server.bind, path = %server.path, "chat-query server listening");
    axum::serve(listener, app).await?;

    Ok(())
}

impl IntoResponse for Reply {
    fn into_response(self) -> Response {
        match self {
            Reply::Preflight => (
                StatusCode::OK,
                [
                    (header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
                    (header::ACCESS_CONTROL_ALLOW_METHODS, "POST, OPTIONS"),
                    (header::ACCESS_CONTROL_ALLOW_HEADERS, "Content-Type"),
                ],
            )
                .into_response(),
            Reply::Json(body) => (
                StatusCode::OK,
                [(header::ACCESS_CONTROL_ALLOW_ORIGIN, "*")],
                Json(body),
            )
                .into_response(),
        }
    }
}

async fn handle_chat_query(State(state): State<AppState>, method: Method, body: Bytes) -> Response {
    let request_id = uuid::Uuid::new_v4();
    let span = info_span!("chat_query", %request_id, %method);

    async move {
        match state.handler.handle(&method, &body).await {
            Ok(reply) => reply.into_response(),
            Err(err) => {
                if err.status().is_server_error() {
                    error!(kind = err.kind(), error = %err, "request failed");
                } else {
                    warn!(kind = err.kind(), error = %err, "request rejected");
                }
                err.into_response()
            }
        }
    }
    .instrument(span)
    .await
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    /// Whether the document store has been connected yet.
    store_connected: bool,
}

async fn handle_health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        store_connected: state.handler.stores().is_connected(),
    })
}
