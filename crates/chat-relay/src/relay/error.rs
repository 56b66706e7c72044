//! Chat handler errors and their HTTP rendering
//!
//! Every failure in the chat handler ends up here exactly once:
//! - Invalid input: 400 JSON, never reaches upstream
//! - Upstream error status: forwarded status (JSON) or an in-stream error frame
//! - Transport / malformed response: 500 JSON or an in-stream error frame

use axum::{
    Json,
    body::Body,
    http::{Response, StatusCode},
    response::IntoResponse,
};
use thiserror::Error;

use super::streaming::{error_stream, event_stream_response};

/// Message returned when the body has no `messages` array
pub const INVALID_INPUT_MESSAGE: &str = "messages[] required";

/// Errors that can occur while relaying a chat request
#[derive(Error, Debug)]
pub enum ChatError {
    /// `messages` missing or not an array
    #[error("messages[] required")]
    InvalidInput,

    /// Upstream answered with a non-success status
    #[error("Upstream error: {status}")]
    Upstream { status: StatusCode, body: String },

    /// Network-level failure talking to upstream
    #[error("{0}")]
    Transport(String),

    /// Upstream's non-streaming body wasn't valid JSON
    #[error("{0}")]
    MalformedResponse(String),
}

impl ChatError {
    /// Map a reqwest failure onto a transport error
    pub fn from_reqwest(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ChatError::Transport(format!("Request timed out: {e}"))
        } else if e.is_connect() {
            ChatError::Transport(format!("Failed to connect to upstream: {e}"))
        } else {
            ChatError::Transport(format!("Request failed: {e}"))
        }
    }

    /// Render the error for the caller.
    ///
    /// When the caller asked for a stream, everything but invalid input is
    /// delivered as a 200 event stream carrying `Error: ...` then `[DONE]`.
    pub fn into_response(self, stream: bool) -> Response<Body> {
        match self {
            ChatError::InvalidInput => json_error(StatusCode::BAD_REQUEST, INVALID_INPUT_MESSAGE),
            ChatError::Upstream { body, .. } if stream => {
                event_stream_response(error_stream(&body))
            }
            ChatError::Upstream { status, body } => json_error(status, &body),
            other if stream => event_stream_response(error_stream(&other.to_string())),
            other => json_error(StatusCode::INTERNAL_SERVER_ERROR, &other.to_string()),
        }
    }

    /// Get the error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            ChatError::InvalidInput => "input",
            ChatError::Upstream { .. } => "upstream",
            ChatError::Transport(_) => "transport",
            ChatError::MalformedResponse(_) => "malformed_response",
        }
    }
}

fn json_error(status: StatusCode, message: &str) -> Response<Body> {
    (status, Json(serde_json::json!({"error": message}))).into_response()
}
