//! Session state shared across turns of one conversation
//!
//! A TTL cache keyed by conversation id. Entries hold notes that the chat
//! front door replays into the history and the built-in tools edit.

mod cache;
mod context;

pub use cache::{DEFAULT_MAX_SESSIONS, DEFAULT_SESSION_TTL, SessionCache};
pub use context::{Note, SessionContext};
