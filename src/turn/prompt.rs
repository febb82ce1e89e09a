//! Prompt assembly
//!
//! A turn renders as: system prompt, chat history, then the user query.
//! The system prompt may reference `{conversation_id}`.

use super::context::TurnContext;
use crate::llm::Message;

/// Frozen prompt layout shared by every turn
#[derive(Debug, Clone, Default)]
pub struct PromptTemplate {
    /// Appended to the turn's own system prompt when non-empty
    preamble: String,
}

impl PromptTemplate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add fixed text after every system prompt
    pub fn with_preamble(mut self, preamble: impl Into<String>) -> Self {
        self.preamble = preamble.into();
        self
    }

    /// Render the model input for a turn
    pub fn render(&self, turn: &TurnContext) -> Vec<Message> {
        let mut messages = Vec::with_capacity(turn.history.len() + 2);

        let system = self.system_text(turn);
        if !system.is_empty() {
            messages.push(Message::system(system));
        }
        messages.extend(turn.history.iter().cloned());
        messages.push(Message::user(&turn.query));
        messages
    }

    fn system_text(&self, turn: &TurnContext) -> String {
        let base = turn.system_prompt.replace("{conversation_id}", &turn.conversation_id);
        match (base.is_empty(), self.preamble.is_empty()) {
            (_, true) => base,
            (true, false) => self.preamble.clone(),
            (false, false) => format!("{}\n\n{}", base, self.preamble),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::Role;

    #[test]
    fn test_render_order() {
        let turn = TurnContext::new("c", "question")
            .with_system_prompt("system")
            .with_history(vec![Message::user("earlier"), Message::assistant("answer")]);
        let messages = PromptTemplate::new().render(&turn);

        let roles: Vec<_> = messages.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::System, Role::User, Role::Assistant, Role::User]);
        assert_eq!(messages[3].content, "question");
    }

    #[test]
    fn test_empty_system_prompt_is_omitted() {
        let messages = PromptTemplate::new().render(&TurnContext::new("c", "q"));
        assert_eq!(messages, vec![Message::user("q")]);
    }

    #[test]
    fn test_conversation_id_substitution_and_preamble() {
        let turn = TurnContext::new("conv-7", "q").with_system_prompt("Conversation {conversation_id}");
        let messages = PromptTemplate::new().with_preamble("Reply in English.").render(&turn);
        assert_eq!(messages[0].content, "Conversation conv-7\n\nReply in English.");
    }
}
