//! Upstream SSE re-framing
//!
//! Reads an OpenAI-style `data: {...}` event stream chunk by chunk and
//! re-emits only the delta text, one `data: <text>\n\n` frame per fragment:
//! - Lines are reassembled across chunk boundaries
//! - Malformed JSON lines are skipped
//! - `data: [DONE]` ends the downstream stream immediately
//! - Upstream EOF without `[DONE]` ends the stream with no terminal frame

use axum::{
    body::Body,
    http::{
        HeaderValue, Response,
        header::{CACHE_CONTROL, CONNECTION, CONTENT_TYPE},
    },
};
use bytes::Bytes;
use futures::stream::{self, Stream};
use std::collections::VecDeque;
use std::convert::Infallible;
use std::fmt;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

/// The terminal token for both upstream and downstream streams
pub const DONE: &str = "[DONE]";

const DATA_PREFIX: &str = "data: ";

/// Replace embedded newlines so a fragment fits in a single `data:` line
pub fn flatten_newlines(text: &str) -> String {
    text.replace('\n', " ")
}

/// Frame `text` as one downstream event
pub fn format_event(text: &str) -> Bytes {
    Bytes::from(format!("{DATA_PREFIX}{text}\n\n"))
}

/// The downstream terminal frame
pub fn done_event() -> Bytes {
    format_event(DONE)
}

/// Frame an error message as a downstream event
pub fn error_event(message: &str) -> Bytes {
    format_event(&format!("Error: {}", flatten_newlines(message)))
}

/// A two-frame stream: the error message followed by `[DONE]`
pub fn error_stream(message: &str) -> impl Stream<Item = Result<Bytes, Infallible>> + Send + use<> {
    stream::iter([Ok(error_event(message)), Ok(done_event())])
}

/// Wrap a frame stream in a `text/event-stream` response.
///
/// The body is polled lazily, so headers reach the caller before the first
/// upstream chunk does.
pub fn event_stream_response<S>(frames: S) -> Response<Body>
where
    S: Stream<Item = Result<Bytes, Infallible>> + Send + 'static,
{
    let mut response = Response::new(Body::from_stream(frames));
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/event-stream"));
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));
    response
}

/// A meaningful upstream event
#[derive(Debug, Clone, PartialEq)]
pub enum SseEvent {
    /// Delta text, newlines already flattened
    Delta(String),
    /// Terminal `[DONE]` marker
    Done,
}

/// Interpret one complete upstream line.
///
/// Returns `None` for blank lines, non-`data:` lines, malformed JSON and
/// events without `choices[0].delta.content` text.
pub fn parse_line(line: &[u8]) -> Option<SseEvent> {
    let line = String::from_utf8_lossy(line);
    let payload = line.trim().strip_prefix(DATA_PREFIX)?;

    if payload == DONE {
        return Some(SseEvent::Done);
    }

    let value: serde_json::Value = match serde_json::from_str(payload) {
        Ok(value) => value,
        Err(e) => {
            tracing::trace!("Skipping malformed upstream line: {e}");
            return None;
        }
    };

    let content = value
        .get("choices")?
        .get(0)?
        .get("delta")?
        .get("content")?
        .as_str()?;

    if content.is_empty() {
        None
    } else {
        Some(SseEvent::Delta(flatten_newlines(content)))
    }
}

/// Line reassembly state carried across upstream chunks
#[derive(Debug, Default)]
pub struct SseLineDecoder {
    buffer: Vec<u8>,
}

impl SseLineDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk and return the events from every line it completed.
    ///
    /// Splitting happens on raw `\n` bytes, which never occur inside a
    /// multi-byte UTF-8 sequence, so characters cut by a chunk boundary are
    /// decoded only once their line is whole. Decoding stops at `[DONE]` and
    /// anything after it is discarded.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(chunk);

        let Some(last_newline) = self.buffer.iter().rposition(|&b| b == b'\n') else {
            return Vec::new();
        };

        let tail = self.buffer.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.buffer, tail);

        let mut events = Vec::new();
        for line in complete.split(|&b| b == b'\n') {
            match parse_line(line) {
                Some(SseEvent::Done) => {
                    events.push(SseEvent::Done);
                    self.buffer.clear();
                    break;
                }
                Some(event) => events.push(event),
                None => {}
            }
        }
        events
    }

    /// Bytes held back waiting for a newline
    pub fn pending(&self) -> &[u8] {
        &self.buffer
    }
}

/// Re-frames an upstream byte stream into downstream event frames.
///
/// Owns the upstream stream and releases it as soon as the exchange is over
/// (`[DONE]`, EOF or a read error). Dropping the `ReframeStream`, as the
/// server does when the caller disconnects, drops the upstream reader too.
pub struct ReframeStream<S> {
    upstream: Option<S>,
    decoder: SseLineDecoder,
    frames: VecDeque<Bytes>,
}

impl<S> ReframeStream<S> {
    pub fn new(upstream: S) -> Self {
        Self {
            upstream: Some(upstream),
            decoder: SseLineDecoder::new(),
            frames: VecDeque::new(),
        }
    }

    /// Whether the upstream reader has been released
    pub fn is_finished(&self) -> bool {
        self.upstream.is_none()
    }
}

impl<S, E> Stream for ReframeStream<S>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
    E: fmt::Display,
{
    type Item = Result<Bytes, Infallible>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;

        loop {
            if let Some(frame) = this.frames.pop_front() {
                return Poll::Ready(Some(Ok(frame)));
            }

            let Some(upstream) = this.upstream.as_mut() else {
                return Poll::Ready(None);
            };

            match ready!(Pin::new(upstream).poll_next(cx)) {
                Some(Ok(chunk)) => {
                    for event in this.decoder.push(&chunk) {
                        match event {
                            SseEvent::Delta(text) => this.frames.push_back(format_event(&text)),
                            SseEvent::Done => {
                                this.frames.push_back(done_event());
                                this.upstream = None;
                            }
                        }
                    }
                }
                Some(Err(e)) => {
                    tracing::error!(error_type = "transport", "Upstream stream failed: {e}");
                    this.frames.push_back(error_event(&e.to_string()));
                    this.frames.push_back(done_event());
                    this.upstream = None;
                }
                None => {
                    tracing::debug!(
                        pending_bytes = this.decoder.pending().len(),
                        "Upstream closed without [DONE]"
                    );
                    this.upstream = None;
                }
            }
        }
    }
}
