//! LLM Client Layer - chat-completions integration with streaming and tool parsing
//!
//! This module provides:
//! - Message, fragment and tool types
//! - ChatModel trait for provider abstraction
//! - OpenAiClient implementation
//! - Fragment streams with fork and scoped release
//! - Tool call extraction

pub mod client;
pub mod openai;
pub mod streaming;
pub mod tool_parser;
pub mod types;

pub use client::{ChatModel, LlmError, MockChatModel};
pub use openai::{OpenAiClient, OpenAiConfig};
pub use streaming::{FragmentResult, FragmentStream, create_stream_channel, parse_sse_chunk};
pub use tool_parser::{
    extract_fragment_tool_calls, extract_tool_calls, parse_arguments, parse_inline_tool_calls, validate_arguments,
};
pub use types::{
    CompletionRequest, Fragment, Message, Role, ToolCall, ToolCallDelta, ToolDescriptor, concat_fragments,
};
