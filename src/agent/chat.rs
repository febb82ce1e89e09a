//! Chat front door types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::llm::{Message, Role};

/// Query used when the latest message is not from the user
pub const DEFAULT_QUERY: &str = "Hello";

/// Inbound chat request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatRequest {
    pub id: String,
    /// Session key; falls back to `id` when empty
    pub conversation_id: String,
    /// Reported model; empty means the configured one
    pub model: String,
    pub messages: Vec<Message>,
    pub stream: bool,
}

impl ChatRequest {
    pub fn new(id: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            id: id.into(),
            messages,
            ..Default::default()
        }
    }

    pub fn with_conversation(mut self, conversation_id: impl Into<String>) -> Self {
        self.conversation_id = conversation_id.into();
        self
    }

    pub fn with_stream(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    pub fn conversation_key(&self) -> &str {
        if self.conversation_id.is_empty() {
            &self.id
        } else {
            &self.conversation_id
        }
    }

    /// Latest user query and the history before it
    pub fn split(&self) -> (String, Vec<Message>) {
        let query = match self.messages.last() {
            Some(last) if last.role == Role::User => last.content.clone(),
            _ => DEFAULT_QUERY.to_string(),
        };
        let history = match self.messages.split_last() {
            Some((_, rest)) => rest.to_vec(),
            None => Vec::new(),
        };
        (query, history)
    }
}

/// Reply to a [`ChatRequest`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatReply {
    pub id: String,
    pub created: DateTime<Utc>,
    pub model: String,
    pub message: Message,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolKind {
    Local,
    Remote,
}

impl std::fmt::Display for ToolKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ToolKind::Local => write!(f, "local"),
            ToolKind::Remote => write!(f, "remote"),
        }
    }
}

/// One bound tool, for listings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInfo {
    pub name: String,
    pub description: String,
    pub kind: ToolKind,
}

/// Keep the newest `max` messages; 0 keeps everything
pub fn trim_history(mut history: Vec<Message>, max: usize) -> Vec<Message> {
    if max > 0 && history.len() > max {
        history.drain(..history.len() - max);
    }
    history
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_takes_last_user_message() {
        let request = ChatRequest::new(
            "r1",
            vec![Message::user("hi"), Message::assistant("hello"), Message::user("weather?")],
        );
        let (query, history) = request.split();
        assert_eq!(query, "weather?");
        assert_eq!(history, vec![Message::user("hi"), Message::assistant("hello")]);
    }

    #[test]
    fn test_split_defaults_query() {
        let request = ChatRequest::new("r1", vec![Message::user("hi"), Message::assistant("hello")]);
        let (query, history) = request.split();
        assert_eq!(query, DEFAULT_QUERY);
        assert_eq!(history, vec![Message::user("hi")]);

        let (query, history) = ChatRequest::new("r2", Vec::new()).split();
        assert_eq!(query, DEFAULT_QUERY);
        assert!(history.is_empty());
    }

    #[test]
    fn test_conversation_key_falls_back_to_id() {
        let request = ChatRequest::new("r1", Vec::new());
        assert_eq!(request.conversation_key(), "r1");
        assert_eq!(request.with_conversation("c9").conversation_key(), "c9");
    }

    #[test]
    fn test_trim_history() {
        let history: Vec<_> = (0..5).map(|i| Message::user(i.to_string())).collect();
        let trimmed = trim_history(history.clone(), 2);
        assert_eq!(trimmed, vec![Message::user("3"), Message::user("4")]);
        assert_eq!(trim_history(history.clone(), 0).len(), 5);
        assert_eq!(trim_history(history, 10).len(), 5);
    }

    #[test]
    fn test_request_deserializes_with_defaults() {
        let request: ChatRequest =
            serde_json::from_str(r#"{"id":"r1","messages":[{"role":"user","content":"hi"}]}"#).unwrap();
        assert!(!request.stream);
        assert!(request.model.is_empty());
        assert_eq!(request.messages[0].content, "hi");
    }

    #[test]
    fn test_tool_kind_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&ToolKind::Remote).unwrap(), r#""remote""#);
        assert_eq!(ToolKind::Local.to_string(), "local");
    }
}
