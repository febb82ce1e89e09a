//! Streaming support for LLM responses.
//!
//! Provides the fragment stream handed from the model provider to the router
//! and the pipeline, plus parsing of chat-completion SSE chunks.

use serde::Deserialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::client::LlmError;
use super::types::{Fragment, Message, ToolCallDelta, concat_fragments};

/// Item delivered by a fragment stream
pub type FragmentResult = Result<Fragment, LlmError>;

type CloseHook = Box<dyn FnOnce() + Send>;

/// Ordered, single-pass stream of response fragments.
///
/// Dropping the stream closes the receiver and runs its close hook exactly
/// once, which releases whatever produces the fragments.
pub struct FragmentStream {
    receiver: mpsc::Receiver<FragmentResult>,
    on_close: Option<CloseHook>,
}

impl FragmentStream {
    /// Create a stream over the given receiver.
    pub fn new(receiver: mpsc::Receiver<FragmentResult>) -> Self {
        Self {
            receiver,
            on_close: None,
        }
    }

    /// Create a stream whose producer task is aborted on close.
    pub fn from_task(receiver: mpsc::Receiver<FragmentResult>, producer: JoinHandle<()>) -> Self {
        Self::new(receiver).with_close_hook(move || producer.abort())
    }

    /// Create an already-complete stream from buffered items.
    pub fn from_items(items: Vec<FragmentResult>) -> Self {
        let (tx, rx) = mpsc::channel(items.len().max(1));
        for item in items {
            // Capacity equals item count, so this never fails
            let _ = tx.try_send(item);
        }
        Self::new(rx)
    }

    /// Add a hook that runs when the stream is closed.
    ///
    /// Hooks compose: an existing hook runs before the new one.
    pub fn with_close_hook(mut self, hook: impl FnOnce() + Send + 'static) -> Self {
        let hook: CloseHook = match self.on_close.take() {
            Some(previous) => Box::new(move || {
                previous();
                hook();
            }),
            None => Box::new(hook),
        };
        self.on_close = Some(hook);
        self
    }

    /// Receive the next fragment. `None` marks end of stream.
    pub async fn recv(&mut self) -> Option<FragmentResult> {
        self.receiver.recv().await
    }

    /// Receive the next fragment unless the caller cancels first.
    pub async fn recv_or_cancel(&mut self, cancel: &CancellationToken) -> Option<FragmentResult> {
        tokio::select! {
            _ = cancel.cancelled() => Some(Err(LlmError::Cancelled)),
            item = self.receiver.recv() => item,
        }
    }

    /// Drain the stream into the terminal message.
    pub async fn collect(mut self, cancel: &CancellationToken) -> Result<Message, LlmError> {
        let mut fragments = Vec::new();
        while let Some(item) = self.recv_or_cancel(cancel).await {
            fragments.push(item?);
        }
        Ok(concat_fragments(&fragments))
    }

    /// Collect only the text of the stream.
    pub async fn collect_text(self, cancel: &CancellationToken) -> Result<String, LlmError> {
        Ok(self.collect(cancel).await?.content)
    }

    /// Stop consuming and release the producer.
    pub fn close(self) {
        drop(self);
    }

    /// Split the stream into two ordered copies.
    ///
    /// A forwarding task feeds both copies. A copy that is dropped stops
    /// receiving; when the primary copy is dropped the forwarder stops and
    /// releases the source.
    pub fn fork(mut self, buffer: usize) -> (FragmentStream, FragmentStream) {
        let buffer = buffer.max(1);
        let (primary_tx, primary_rx) = mpsc::channel(buffer);
        let (branch_tx, branch_rx) = mpsc::channel(buffer);

        let forwarder = tokio::spawn(async move {
            let mut branch_tx = Some(branch_tx);
            while let Some(item) = self.recv().await {
                if let Some(tx) = &branch_tx {
                    let copy = match &item {
                        Ok(fragment) => Ok(fragment.clone()),
                        Err(e) => Err(LlmError::Stream(e.to_string())),
                    };
                    if tx.send(copy).await.is_err() {
                        branch_tx = None;
                    }
                }
                if primary_tx.send(item).await.is_err() {
                    break;
                }
            }
        });

        (
            FragmentStream::from_task(primary_rx, forwarder),
            FragmentStream::new(branch_rx),
        )
    }
}

impl Drop for FragmentStream {
    fn drop(&mut self) {
        self.receiver.close();
        if let Some(hook) = self.on_close.take() {
            hook();
        }
    }
}

impl std::fmt::Debug for FragmentStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FragmentStream")
            .field("closed", &self.receiver.is_closed())
            .finish()
    }
}

/// Builder for stream pairs (sender and stream).
pub fn create_stream_channel(buffer_size: usize) -> (mpsc::Sender<FragmentResult>, FragmentStream) {
    let (tx, rx) = mpsc::channel(buffer_size.max(1));
    (tx, FragmentStream::new(rx))
}

#[derive(Debug, Deserialize)]
struct ChunkBody {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ChunkDelta {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<ChunkToolCall>,
}

#[derive(Debug, Deserialize)]
struct ChunkToolCall {
    #[serde(default)]
    index: usize,
    id: Option<String>,
    function: Option<ChunkFunction>,
}

#[derive(Debug, Deserialize)]
struct ChunkFunction {
    name: Option<String>,
    arguments: Option<String>,
}

/// Parse one SSE `data:` payload of a chat-completions stream.
///
/// ```text
/// data: {"choices":[{"delta":{"content":"Hi"}}]}
/// data: [DONE]
/// ```
///
/// Returns `None` for the `[DONE]` marker and empty payloads.
pub fn parse_sse_chunk(data: &str) -> Option<FragmentResult> {
    let data = data.trim();
    if data.is_empty() || data == "[DONE]" {
        return None;
    }

    let body: ChunkBody = match serde_json::from_str(data) {
        Ok(body) => body,
        Err(e) => return Some(Err(LlmError::JsonError(e))),
    };

    let mut fragment = Fragment::default();
    for choice in body.choices {
        if let Some(text) = choice.delta.content {
            fragment.content.push_str(&text);
        }
        for call in choice.delta.tool_calls {
            let (name, arguments) = match call.function {
                Some(f) => (f.name, f.arguments.unwrap_or_default()),
                None => (None, String::new()),
            };
            fragment.tool_calls.push(ToolCallDelta {
                index: call.index,
                id: call.id,
                name,
                arguments,
            });
        }
        if choice.finish_reason.is_some() {
            fragment.finish_reason = choice.finish_reason;
        }
    }

    Some(Ok(fragment))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_stream_recv_in_order() {
        let (tx, mut stream) = create_stream_channel(10);
        tx.send(Ok(Fragment::text("Hello"))).await.unwrap();
        tx.send(Ok(Fragment::text(" World"))).await.unwrap();
        drop(tx);

        assert_eq!(stream.recv().await.unwrap().unwrap().content, "Hello");
        assert_eq!(stream.recv().await.unwrap().unwrap().content, " World");
        assert!(stream.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_collect_concatenates() {
        let stream = FragmentStream::from_items(vec![
            Ok(Fragment::text("Hello ")),
            Ok(Fragment::text("World")),
        ]);
        let text = stream.collect_text(&CancellationToken::new()).await.unwrap();
        assert_eq!(text, "Hello World");
    }

    #[tokio::test]
    async fn test_collect_propagates_error() {
        let stream = FragmentStream::from_items(vec![
            Ok(Fragment::text("partial")),
            Err(LlmError::Stream("connection reset".to_string())),
        ]);
        let result = stream.collect(&CancellationToken::new()).await;
        assert!(matches!(result, Err(LlmError::Stream(_))));
    }

    #[tokio::test]
    async fn test_collect_honours_cancellation() {
        let (_tx, stream) = create_stream_channel(1);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = stream.collect(&cancel).await;
        assert!(matches!(result, Err(LlmError::Cancelled)));
    }

    #[test]
    fn test_close_hook_runs_once() {
        let closes = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&closes);
        let (_tx, stream) = create_stream_channel(1);
        let stream = stream.with_close_hook(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        stream.close();
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_close_hooks_compose() {
        let closes = Arc::new(AtomicUsize::new(0));
        let first = Arc::clone(&closes);
        let second = Arc::clone(&closes);
        let (_tx, stream) = create_stream_channel(1);
        drop(
            stream
                .with_close_hook(move || {
                    first.fetch_add(1, Ordering::SeqCst);
                })
                .with_close_hook(move || {
                    second.fetch_add(10, Ordering::SeqCst);
                }),
        );
        assert_eq!(closes.load(Ordering::SeqCst), 11);
    }

    #[tokio::test]
    async fn test_drop_closes_sender_side() {
        let (tx, stream) = create_stream_channel(1);
        drop(stream);
        assert!(tx.is_closed());
    }

    #[tokio::test]
    async fn test_fork_delivers_to_both_copies() {
        let source = FragmentStream::from_items(vec![Ok(Fragment::text("a")), Ok(Fragment::text("b"))]);
        let (primary, branch) = source.fork(8);
        let cancel = CancellationToken::new();

        assert_eq!(branch.collect_text(&cancel).await.unwrap(), "ab");
        assert_eq!(primary.collect_text(&cancel).await.unwrap(), "ab");
    }

    #[tokio::test]
    async fn test_fork_primary_survives_dropped_branch() {
        let source = FragmentStream::from_items(vec![
            Ok(Fragment::text("one")),
            Ok(Fragment::text("two")),
            Ok(Fragment::text("three")),
        ]);
        let (primary, mut branch) = source.fork(1);
        let first = branch.recv().await.unwrap().unwrap();
        assert_eq!(first.content, "one");
        drop(branch);

        let text = primary.collect_text(&CancellationToken::new()).await.unwrap();
        assert_eq!(text, "onetwothree");
    }

    #[test]
    fn test_parse_sse_chunk_text() {
        let fragment = parse_sse_chunk(r#"{"choices":[{"delta":{"content":"Hi"}}]}"#)
            .unwrap()
            .unwrap();
        assert_eq!(fragment.content, "Hi");
        assert!(fragment.tool_calls.is_empty());
    }

    #[test]
    fn test_parse_sse_chunk_tool_call() {
        let data = r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"id":"call_1","type":"function","function":{"name":"recall_context","arguments":""}}]},"finish_reason":null}]}"#;
        let fragment = parse_sse_chunk(data).unwrap().unwrap();
        assert_eq!(fragment.tool_calls.len(), 1);
        assert_eq!(fragment.tool_calls[0].id.as_deref(), Some("call_1"));
        assert_eq!(fragment.tool_calls[0].name.as_deref(), Some("recall_context"));
    }

    #[test]
    fn test_parse_sse_chunk_finish_reason() {
        let data = r#"{"choices":[{"delta":{},"finish_reason":"stop"}]}"#;
        let fragment = parse_sse_chunk(data).unwrap().unwrap();
        assert_eq!(fragment.finish_reason.as_deref(), Some("stop"));
    }

    #[test]
    fn test_parse_sse_chunk_done_and_empty() {
        assert!(parse_sse_chunk("[DONE]").is_none());
        assert!(parse_sse_chunk("").is_none());
    }

    #[test]
    fn test_parse_sse_chunk_invalid() {
        let result = parse_sse_chunk("not json").unwrap();
        assert!(matches!(result, Err(LlmError::JsonError(_))));
    }
}
