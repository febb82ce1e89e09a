//! Local tool system
//!
//! Tools run in-process. Each turn gets a ToolContext scoped to its
//! conversation, which gives access to the shared session cache.

mod context;
mod forget_context;
mod recall_context;
mod registry;
mod remember_context;

pub use context::{ToolContext, ToolError};
pub use forget_context::ForgetContextTool;
pub use recall_context::RecallContextTool;
pub use registry::ToolRegistry;
pub use remember_context::RememberContextTool;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::llm::ToolDescriptor;

/// A tool that can be called by the model
#[async_trait]
pub trait Tool: Send + Sync {
    /// Tool name (matches the model's tool-call name)
    fn name(&self) -> &str;

    /// Human-readable description
    fn description(&self) -> &str;

    /// JSON Schema for input parameters
    fn input_schema(&self) -> Value;

    /// Descriptor used for model binding and lookup
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor::new(self.name(), self.description(), self.input_schema())
    }

    /// Execute the tool with raw argument text, returning result text
    async fn invoke(&self, arguments: &str, ctx: &ToolContext) -> Result<String, ToolError>;
}

/// Decode raw argument text into a tool's input type.
///
/// Empty text decodes as `{}` so tools with all-optional inputs accept it.
pub(crate) fn parse_input<T: DeserializeOwned>(arguments: &str) -> Result<T, ToolError> {
    let text = if arguments.trim().is_empty() { "{}" } else { arguments };
    serde_json::from_str(text).map_err(|e| ToolError::InvalidArguments(e.to_string()))
}
