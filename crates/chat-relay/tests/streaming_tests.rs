//! Tests for re-framing upstream SSE into downstream frames
//!
//! Feeds `ReframeStream` hand-built chunk sequences to cover line
//! reassembly, UTF-8 boundaries, termination and cancellation.

use bytes::Bytes;
use futures::stream::{self, Stream, StreamExt};
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::{Context, Poll};

use chat_relay::relay::ReframeStream;

type Chunk = Result<Bytes, std::io::Error>;
type ChunkStream = stream::Iter<std::vec::IntoIter<Chunk>>;

fn chunks(parts: &[&[u8]]) -> ChunkStream {
    let owned: Vec<Chunk> = parts
        .iter()
        .map(|p| Ok(Bytes::copy_from_slice(p)))
        .collect();
    stream::iter(owned)
}

fn text_chunks(parts: &[&str]) -> ChunkStream {
    let bytes: Vec<&[u8]> = parts.iter().map(|p| p.as_bytes()).collect();
    chunks(&bytes)
}

async fn collect<S>(stream: ReframeStream<S>) -> String
where
    S: Stream<Item = Chunk> + Unpin,
{
    let frames: Vec<Bytes> = stream.map(|frame| frame.unwrap()).collect().await;
    frames
        .iter()
        .map(|f| String::from_utf8(f.to_vec()).unwrap())
        .collect()
}

/// Upstream stream that records when it is dropped
struct TrackedStream<S> {
    inner: S,
    dropped: Arc<AtomicBool>,
}

impl<S: Stream<Item = Chunk> + Unpin> Stream for TrackedStream<S> {
    type Item = Chunk;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

impl<S> Drop for TrackedStream<S> {
    fn drop(&mut self) {
        self.dropped.store(true, Ordering::SeqCst);
    }
}

fn tracked<S>(inner: S) -> (TrackedStream<S>, Arc<AtomicBool>) {
    let dropped = Arc::new(AtomicBool::new(false));
    (
        TrackedStream {
            inner,
            dropped: Arc::clone(&dropped),
        },
        dropped,
    )
}

#[tokio::test]
async fn test_basic_reframing() {
    let upstream = text_chunks(&[
        r#"data: {"choices":[{"delta":{"content":"A"}}]}"#,
        "\n\n",
        r#"data: {"choices":[{"delta":{"content":"B"}}]}"#,
        "\n\ndata: [DONE]\n\n",
    ]);

    let output = collect(ReframeStream::new(upstream)).await;
    assert_eq!(output, "data: A\n\ndata: B\n\ndata: [DONE]\n\n");
}

#[tokio::test]
async fn test_line_split_across_many_chunks() {
    let full = "data: {\"choices\":[{\"delta\":{\"content\":\"Hello world\"}}]}\n\ndata: [DONE]\n\n";
    let parts: Vec<&[u8]> = full.as_bytes().chunks(3).collect();

    let output = collect(ReframeStream::new(chunks(&parts))).await;
    assert_eq!(output, "data: Hello world\n\ndata: [DONE]\n\n");
}

#[tokio::test]
async fn test_multibyte_characters_split_byte_by_byte() {
    let full = "data: {\"choices\":[{\"delta\":{\"content\":\"\u{65e5}\u{672c}\u{1f680}\"}}]}\n\ndata: [DONE]\n\n";
    let parts: Vec<&[u8]> = full.as_bytes().chunks(1).collect();

    let output = collect(ReframeStream::new(chunks(&parts))).await;
    assert_eq!(output, "data: \u{65e5}\u{672c}\u{1f680}\n\ndata: [DONE]\n\n");
}

#[tokio::test]
async fn test_crlf_line_endings() {
    let upstream = text_chunks(&[
        "data: {\"choices\":[{\"delta\":{\"content\":\"A\"}}]}\r\n\r\n",
        "data: [DONE]\r\n\r\n",
    ]);

    let output = collect(ReframeStream::new(upstream)).await;
    assert_eq!(output, "data: A\n\ndata: [DONE]\n\n");
}

#[tokio::test]
async fn test_eof_without_done_has_no_terminal_frame() {
    let upstream = text_chunks(&[
        "data: {\"choices\":[{\"delta\":{\"content\":\"A\"}}]}\n\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\"unterminated\"}}]}",
    ]);

    let output = collect(ReframeStream::new(upstream)).await;
    assert_eq!(output, "data: A\n\n");
}

#[tokio::test]
async fn test_empty_upstream_produces_nothing() {
    let output = collect(ReframeStream::new(chunks(&[]))).await;
    assert_eq!(output, "");
}

#[tokio::test]
async fn test_read_error_emits_error_and_done() {
    let upstream = stream::iter(vec![
        Ok(Bytes::from_static(
            b"data: {\"choices\":[{\"delta\":{\"content\":\"A\"}}]}\n\n",
        )),
        Err(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "connection reset",
        )),
        Ok(Bytes::from_static(
            b"data: {\"choices\":[{\"delta\":{\"content\":\"B\"}}]}\n\n",
        )),
    ]);

    let output = collect(ReframeStream::new(upstream)).await;
    assert_eq!(
        output,
        "data: A\n\ndata: Error: connection reset\n\ndata: [DONE]\n\n"
    );
}

#[tokio::test]
async fn test_frames_forwarded_before_upstream_finishes() {
    let (tx, rx) = tokio::sync::mpsc::channel::<Chunk>(10);
    let mut frames = ReframeStream::new(tokio_stream::wrappers::ReceiverStream::new(rx));

    tx.send(Ok(Bytes::from_static(
        b"data: {\"choices\":[{\"delta\":{\"content\":\"first\"}}]}\n\n",
    )))
    .await
    .unwrap();

    let first = frames.next().await.unwrap().unwrap();
    assert_eq!(first, Bytes::from("data: first\n\n"));

    tx.send(Ok(Bytes::from_static(b"data: [DONE]\n\n")))
        .await
        .unwrap();

    let done = frames.next().await.unwrap().unwrap();
    assert_eq!(done, Bytes::from("data: [DONE]\n\n"));
    assert!(frames.next().await.is_none());
}

#[tokio::test]
async fn test_done_releases_upstream_immediately() {
    let (tx, rx) = tokio::sync::mpsc::channel::<Chunk>(10);
    let (upstream, dropped) = tracked(tokio_stream::wrappers::ReceiverStream::new(rx));
    let mut frames = ReframeStream::new(upstream);

    tx.send(Ok(Bytes::from_static(b"data: [DONE]\n\n")))
        .await
        .unwrap();

    let done = frames.next().await.unwrap().unwrap();
    assert_eq!(done, Bytes::from("data: [DONE]\n\n"));
    assert!(frames.is_finished());
    assert!(dropped.load(Ordering::SeqCst));

    // The receiver went with the upstream even though the sender is alive.
    assert!(tx.is_closed());
    assert!(frames.next().await.is_none());
}

#[tokio::test]
async fn test_dropping_downstream_drops_upstream() {
    let (tx, rx) = tokio::sync::mpsc::channel::<Chunk>(10);
    let (upstream, dropped) = tracked(tokio_stream::wrappers::ReceiverStream::new(rx));
    let mut frames = ReframeStream::new(upstream);

    tx.send(Ok(Bytes::from_static(
        b"data: {\"choices\":[{\"delta\":{\"content\":\"partial\"}}]}\n\n",
    )))
    .await
    .unwrap();
    let _ = frames.next().await;
    assert!(!dropped.load(Ordering::SeqCst));

    drop(frames);

    assert!(dropped.load(Ordering::SeqCst));
    assert!(tx.is_closed());
}
