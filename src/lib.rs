//! Relay - chat turn orchestration with local and remote tool routing
//!
//! Each turn peeks at the model's streamed reply, decides whether it calls a
//! tool, and runs that tool either in-process or on a remote provider.

pub mod agent;
pub mod config;
pub mod error;
pub mod llm;
pub mod remote;
pub mod session;
pub mod tools;
pub mod turn;

pub use agent::{Agent, ChatReply, ChatRequest};
pub use error::{RelayError, Result};
