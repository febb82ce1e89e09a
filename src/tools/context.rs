//! Tool execution context - scoped to a single turn

use std::sync::Arc;

use crate::session::SessionCache;

/// Execution context for local tools - scoped to one conversation
#[derive(Debug, Clone)]
pub struct ToolContext {
    /// Conversation the turn belongs to; keys the session cache
    pub conversation_id: String,

    session: Arc<SessionCache>,
}

impl ToolContext {
    pub fn new(conversation_id: impl Into<String>, session: Arc<SessionCache>) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            session,
        }
    }

    /// Session cache shared by every turn
    pub fn session(&self) -> &SessionCache {
        &self.session
    }
}

/// Errors that can occur during local tool execution
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("{0}")]
    Execution(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_shares_session() {
        let cache = Arc::new(SessionCache::default());
        let ctx = ToolContext::new("conv-1", Arc::clone(&cache));
        ctx.session().update("conv-1", |s| s.set_note("k", "v"));
        assert!(cache.get("conv-1").is_some());
        assert_eq!(ctx.conversation_id, "conv-1");
    }

    #[test]
    fn test_tool_error_display() {
        let err = ToolError::MissingField {
            field: "key".to_string(),
        };
        assert_eq!(err.to_string(), "Missing required field: key");
        assert_eq!(ToolError::Execution("boom".to_string()).to_string(), "boom");
    }
}
