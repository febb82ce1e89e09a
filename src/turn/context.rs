//! Per-request turn data

use crate::llm::Message;

/// Everything one turn needs; built per request and read-only afterwards
#[derive(Debug, Clone, PartialEq)]
pub struct TurnContext {
    pub conversation_id: String,
    pub system_prompt: String,
    /// Prior messages, oldest first
    pub history: Vec<Message>,
    /// Latest user query
    pub query: String,
}

impl TurnContext {
    pub fn new(conversation_id: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            system_prompt: String::new(),
            history: Vec::new(),
            query: query.into(),
        }
    }

    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = system_prompt.into();
        self
    }

    pub fn with_history(mut self, history: Vec<Message>) -> Self {
        self.history = history;
        self
    }
}
