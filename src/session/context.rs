//! Per-conversation notes kept between turns

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::llm::Message;

/// One remembered note
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    pub key: String,
    pub value: String,
}

/// Notes stored for a conversation, in insertion order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionContext {
    pub notes: Vec<Note>,
    pub updated_at: DateTime<Utc>,
}

impl SessionContext {
    pub fn new() -> Self {
        Self {
            notes: Vec::new(),
            updated_at: Utc::now(),
        }
    }

    /// Insert or replace a note; a replaced note keeps its position
    pub fn set_note(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.notes.iter_mut().find(|n| n.key == key) {
            Some(note) => note.value = value,
            None => self.notes.push(Note { key, value }),
        }
        self.updated_at = Utc::now();
    }

    /// Remove a note, returning whether it existed
    pub fn remove_note(&mut self, key: &str) -> bool {
        let before = self.notes.len();
        self.notes.retain(|n| n.key != key);
        let removed = self.notes.len() != before;
        if removed {
            self.updated_at = Utc::now();
        }
        removed
    }

    pub fn get_note(&self, key: &str) -> Option<&str> {
        self.notes.iter().find(|n| n.key == key).map(|n| n.value.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    /// Render the notes as user messages appended to the chat history
    pub fn to_messages(&self) -> Vec<Message> {
        self.notes
            .iter()
            .map(|n| Message::user(format!("{}: {}", n.key, n.value)))
            .collect()
    }
}

impl Default for SessionContext {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_note_replaces_in_place() {
        let mut ctx = SessionContext::new();
        ctx.set_note("module", "billing");
        ctx.set_note("entity", "invoice");
        ctx.set_note("module", "payments");

        assert_eq!(ctx.notes.len(), 2);
        assert_eq!(ctx.notes[0].key, "module");
        assert_eq!(ctx.get_note("module"), Some("payments"));
    }

    #[test]
    fn test_remove_note() {
        let mut ctx = SessionContext::new();
        ctx.set_note("a", "1");
        assert!(ctx.remove_note("a"));
        assert!(!ctx.remove_note("a"));
        assert!(ctx.is_empty());
    }

    #[test]
    fn test_to_messages() {
        let mut ctx = SessionContext::new();
        ctx.set_note("module", "billing");
        let messages = ctx.to_messages();
        assert_eq!(messages, vec![Message::user("module: billing")]);
    }
}
