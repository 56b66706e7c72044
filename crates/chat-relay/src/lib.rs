//! chat-relay - Streaming chat-completion relay
//!
//! Accepts chat requests on `POST /api/chat`, forwards them to an
//! OpenAI-compatible upstream and returns either a single JSON reply or a
//! re-framed server-sent event stream.

pub mod config;
pub mod error;
pub mod relay;

pub use error::RelayError;
