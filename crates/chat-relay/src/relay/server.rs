//! HTTP server for the chat relay
//!
//! Serves `POST /api/chat` and falls back to static files for every other
//! path. Each chat request is composed, sent upstream once, and answered
//! with either a JSON reply or a re-framed event stream.

use axum::{
    Json, Router,
    body::{Body, Bytes},
    extract::State,
    http::{Response, StatusCode},
    response::IntoResponse,
    routing::post,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::Instrument;
use uuid::Uuid;

use crate::config::Config;
use crate::error::{RelayError, Result};

use super::error::ChatError;
use super::request::{ChatRequest, extract_reply};
use super::streaming::{ReframeStream, event_stream_response};

/// Shared application state for all handlers
#[derive(Clone)]
pub struct AppState {
    /// Relay configuration, read-only after startup
    pub config: Config,
    /// HTTP client for upstream requests
    pub client: reqwest::Client,
}

impl AppState {
    /// Build state with an upstream client configured from `config`
    pub fn new(config: Config) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(secs) = config.upstream.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }

        let client = builder
            .build()
            .map_err(|e| RelayError::Server(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self { config, client })
    }
}

/// The relay server
pub struct RelayServer {
    config: Config,
}

impl RelayServer {
    /// Create a new relay server with the given configuration
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Bind the listener and serve until Ctrl+C or SIGTERM
    pub async fn serve(self) -> Result<()> {
        let addr = self.config.server.listen_addr()?;

        tracing::info!("Upstream: {}", self.config.upstream.base_url);
        tracing::info!("Default model: {}", self.config.upstream.default_model);
        if self.config.upstream.api_key.is_none() {
            tracing::warn!("No upstream API key configured; upstream calls will likely fail");
        }
        tracing::info!(
            "Serving static files from {}",
            self.config.server.static_dir.display()
        );

        let state = Arc::new(AppState::new(self.config)?);
        let app = create_router(state);

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| RelayError::Server(format!("Failed to bind to {addr}: {e}")))?;

        tracing::info!("Listening on port {}", addr.port());

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| RelayError::Server(format!("Server error: {e}")))?;

        tracing::info!("Relay server shut down gracefully");
        Ok(())
    }
}

/// Create the router: the chat endpoint plus static files at `/`
pub fn create_router(state: Arc<AppState>) -> Router {
    let static_files = ServeDir::new(&state.config.server.static_dir);

    Router::new()
        .route("/api/chat", post(chat_handler))
        .fallback_service(static_files)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn chat_handler(State(state): State<Arc<AppState>>, body: Bytes) -> Response<Body> {
    let span = tracing::info_span!("chat", request_id = %Uuid::new_v4());
    handle_chat(&state, &body).instrument(span).await
}

/// Validate, relay and render one chat request.
///
/// This is the single place failures are caught: whatever goes wrong after
/// validation is rendered according to the caller's `stream` flag.
async fn handle_chat(state: &AppState, body: &[u8]) -> Response<Body> {
    let request = match ChatRequest::from_slice(body) {
        Ok(request) => request,
        Err(e) => {
            tracing::debug!("Rejected chat request: {e}");
            return e.into_response(false);
        }
    };

    let stream = request.stream;
    match relay_chat(state, request).await {
        Ok(response) => response,
        Err(e) => {
            match &e {
                ChatError::Upstream { status, body } => tracing::warn!(
                    error_type = e.category(),
                    status = %status,
                    body_length = body.len(),
                    "Upstream returned error"
                ),
                _ => tracing::error!(
                    error_type = e.category(),
                    error_message = %e,
                    "Chat relay failed"
                ),
            }
            e.into_response(stream)
        }
    }
}

async fn relay_chat(
    state: &AppState,
    request: ChatRequest,
) -> std::result::Result<Response<Body>, ChatError> {
    let stream = request.stream;
    let upstream = &state.config.upstream;
    let payload = request.into_upstream(&upstream.default_model);

    tracing::debug!(
        model = %payload.model,
        stream,
        messages = payload.messages.len(),
        "Dispatching chat request upstream"
    );

    let mut builder = state
        .client
        .post(upstream.chat_completions_url())
        .json(&payload);
    if let Some(api_key) = &upstream.api_key {
        builder = builder.bearer_auth(api_key);
    }

    let response = builder.send().await.map_err(ChatError::from_reqwest)?;

    let status = StatusCode::from_u16(response.status().as_u16())
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    tracing::debug!(status = %status, "Upstream responded");

    if !status.is_success() {
        let body = response.text().await.map_err(ChatError::from_reqwest)?;
        return Err(ChatError::Upstream { status, body });
    }

    if stream {
        let frames = ReframeStream::new(Box::pin(response.bytes_stream()));
        return Ok(event_stream_response(frames));
    }

    let body = response.bytes().await.map_err(ChatError::from_reqwest)?;
    let value: serde_json::Value = serde_json::from_slice(&body)
        .map_err(|e| ChatError::MalformedResponse(format!("Invalid JSON from upstream: {e}")))?;

    Ok(Json(serde_json::json!({"reply": extract_reply(&value)})).into_response())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown");
        },
    }
}
