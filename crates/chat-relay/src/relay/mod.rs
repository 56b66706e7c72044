mod error;
mod request;
mod server;
mod streaming;

pub use error::{ChatError, INVALID_INPUT_MESSAGE};
pub use request::{ChatRequest, DEFAULT_TEMPERATURE, UpstreamRequest, extract_reply};
pub use server::{AppState, RelayServer, create_router};
pub use streaming::{
    DONE, ReframeStream, SseEvent, SseLineDecoder, done_event, error_event, error_stream,
    event_stream_response, flatten_newlines, format_event, parse_line,
};
