//! Tool dispatcher
//!
//! Executes the calls of a terminal model message on the chosen side and
//! folds the results into one assistant message. Tool failures become text
//! in that message; they never fail the turn.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio_util::sync::CancellationToken;

use crate::llm::{Message, ToolCall, extract_tool_calls, validate_arguments};
use crate::remote::{ProviderPool, ToolCallEnvelope};
use crate::tools::{Tool, ToolContext, ToolRegistry};

const LOCAL_HEADER: &str = "I have processed your request. Results:\n\n";
const REMOTE_HEADER: &str = "I have processed your tool call request. Results:\n\n";
const NO_RESULT: &str = "No result";
const PANICKED: &str = "tool panicked";

/// Execution side of a single call
#[derive(Clone)]
pub enum ToolTarget {
    Local(Arc<dyn Tool>),
    Remote,
}

impl std::fmt::Debug for ToolTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ToolTarget::Local(tool) => f.debug_tuple("Local").field(&tool.name()).finish(),
            ToolTarget::Remote => f.write_str("Remote"),
        }
    }
}

fn result_entry(name: &str, result: &str) -> String {
    format!("**Tool**: {}\n**Result**: {}\n\n", name, result)
}

/// Validate and run one local call; a panic inside the tool becomes an error
async fn run_local(tool: &dyn Tool, call: &ToolCall, ctx: &ToolContext) -> Result<String, String> {
    validate_arguments(call, &tool.descriptor()).map_err(|e| e.to_string())?;

    match AssertUnwindSafe(tool.invoke(&call.arguments, ctx)).catch_unwind().await {
        Ok(result) => result.map_err(|e| e.to_string()),
        Err(_) => {
            log::error!("Local tool '{}' panicked", call.name);
            Err(PANICKED.to_string())
        }
    }
}

#[derive(Debug)]
pub struct ToolDispatcher {
    registry: Arc<ToolRegistry>,
    pool: Arc<ProviderPool>,
}

impl ToolDispatcher {
    pub fn new(registry: Arc<ToolRegistry>, pool: Arc<ProviderPool>) -> Self {
        Self { registry, pool }
    }

    /// Decide where a call named `name` runs
    pub fn resolve(&self, name: &str) -> ToolTarget {
        match self.registry.get(name) {
            Some(tool) => ToolTarget::Local(tool),
            None => ToolTarget::Remote,
        }
    }

    /// Run every local call of `message`, in order; other calls are skipped
    pub async fn dispatch_local(&self, message: Message, ctx: &ToolContext) -> Message {
        let calls = extract_tool_calls(&message);
        if calls.is_empty() {
            return message;
        }

        let mut content = String::from(LOCAL_HEADER);
        for call in &calls {
            let ToolTarget::Local(tool) = self.resolve(&call.name) else {
                log::debug!("Skipping non-local call '{}' in local dispatch", call.name);
                continue;
            };

            log::info!("Running local tool '{}' with arguments: {}", call.name, call.arguments);
            let result = match run_local(tool.as_ref(), call, ctx).await {
                Ok(output) => format!("\n```json\n{}\n```", output),
                Err(e) => {
                    log::warn!("Local tool '{}' failed: {}", call.name, e);
                    format!("Error executing tool: {}", e)
                }
            };
            content.push_str(&result_entry(&call.name, &result));
        }

        Message::assistant(content)
    }

    /// Run the first non-local call of `message` through the provider pool
    pub async fn dispatch_remote(&self, message: Message, cancel: &CancellationToken) -> Message {
        let calls = extract_tool_calls(&message);
        if calls.is_empty() {
            return message;
        }

        let mut name = String::new();
        let mut content = NO_RESULT.to_string();
        let remote = calls.iter().find(|c| matches!(self.resolve(&c.name), ToolTarget::Remote));
        if let Some(call) = remote {
            log::info!("Running remote tool '{}' with arguments: {}", call.name, call.arguments);
            name = call.name.clone();
            content = match self.pool.execute_tool(&call.name, &call.arguments, cancel).await {
                Ok(raw) => match serde_json::from_str::<ToolCallEnvelope>(&raw) {
                    Ok(envelope) => envelope.first_text().map(str::to_string).unwrap_or(raw),
                    Err(e) => {
                        log::debug!("Remote result is not a content envelope: {}", e);
                        raw
                    }
                },
                Err(e) => {
                    log::warn!("Remote tool '{}' failed: {}", call.name, e);
                    format!("Error executing tool: {}", e)
                }
            };
        }

        let skipped = calls.len().saturating_sub(1);
        if remote.is_some() && skipped > 0 {
            log::debug!("Only the first remote call runs; {} other call(s) ignored", skipped);
        }

        Message::assistant(format!("{}{}", REMOTE_HEADER, result_entry(&name, &content)))
    }
}
