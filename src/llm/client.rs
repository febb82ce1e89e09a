//! Core model-provider trait, errors and a scripted mock

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use super::streaming::{FragmentResult, FragmentStream};
use super::types::{CompletionRequest, Fragment, Message};

/// Model provider - each call is independent
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Model identifier sent with every request
    fn model_id(&self) -> &str;

    /// Single completion request (blocking until the whole message is ready)
    async fn complete(&self, request: CompletionRequest) -> Result<Message, LlmError>;

    /// Streaming completion; fragments arrive in order
    async fn stream(&self, request: CompletionRequest) -> Result<FragmentStream, LlmError>;
}

/// Errors that can occur during model-provider operations
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },

    #[error("API error {status}: {message}")]
    ApiError { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("JSON parsing error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Missing API key: environment variable {env_var} not set")]
    MissingApiKey { env_var: String },

    #[error("Event source error: {0}")]
    EventSource(String),

    #[error("Stream error: {0}")]
    Stream(String),

    #[error("Request cancelled")]
    Cancelled,
}

/// Scripted model for tests and offline runs.
///
/// `complete` pops queued messages, `stream` pops queued fragment scripts.
/// With an empty queue both answer with a fixed text reply.
pub struct MockChatModel {
    model: String,
    completions: Mutex<VecDeque<Message>>,
    streams: Mutex<VecDeque<Vec<FragmentResult>>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl MockChatModel {
    pub const DEFAULT_REPLY: &'static str = "mock response";

    pub fn new() -> Self {
        Self {
            model: "mock-model".to_string(),
            completions: Mutex::new(VecDeque::new()),
            streams: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Queue a whole message for the next `complete` call
    pub fn with_completion(self, message: Message) -> Self {
        self.completions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(message);
        self
    }

    /// Queue a fragment script for the next `stream` call
    pub fn with_stream(self, fragments: Vec<Fragment>) -> Self {
        self.with_stream_items(fragments.into_iter().map(Ok).collect())
    }

    /// Queue a fragment script that may include errors
    pub fn with_stream_items(self, items: Vec<FragmentResult>) -> Self {
        self.streams
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(items);
        self
    }

    /// Requests seen so far
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn record(&self, request: CompletionRequest) {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request);
    }
}

impl Default for MockChatModel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChatModel for MockChatModel {
    fn model_id(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: CompletionRequest) -> Result<Message, LlmError> {
        self.record(request);
        let queued = self
            .completions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        Ok(queued.unwrap_or_else(|| Message::assistant(Self::DEFAULT_REPLY)))
    }

    async fn stream(&self, request: CompletionRequest) -> Result<FragmentStream, LlmError> {
        self.record(request);
        let queued = self.streams.lock().unwrap_or_else(PoisonError::into_inner).pop_front();
        let items = queued.unwrap_or_else(|| vec![Ok(Fragment::text(Self::DEFAULT_REPLY))]);
        Ok(FragmentStream::from_items(items))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_util::sync::CancellationToken;

    #[test]
    fn test_missing_api_key_message() {
        let err = LlmError::MissingApiKey {
            env_var: "OPENAI_API_KEY".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Missing API key: environment variable OPENAI_API_KEY not set"
        );
    }

    #[tokio::test]
    async fn test_mock_complete_uses_queue_then_default() {
        let mock = MockChatModel::new().with_completion(Message::assistant("first"));
        let first = mock.complete(CompletionRequest::new("m")).await.unwrap();
        let second = mock.complete(CompletionRequest::new("m")).await.unwrap();
        assert_eq!(first.content, "first");
        assert_eq!(second.content, MockChatModel::DEFAULT_REPLY);
        assert_eq!(mock.requests().len(), 2);
    }

    #[tokio::test]
    async fn test_mock_stream_replays_script() {
        let mock = MockChatModel::new().with_stream(vec![Fragment::text("a"), Fragment::text("b")]);
        let stream = mock.stream(CompletionRequest::new("m")).await.unwrap();
        let text = stream.collect_text(&CancellationToken::new()).await.unwrap();
        assert_eq!(text, "ab");
        assert_eq!(mock.model_id(), "mock-model");
    }
}
