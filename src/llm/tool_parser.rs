//! Tool call extraction from model output
//!
//! Two separate stages: structured calls attached by the provider, and a
//! best-effort parse of text content that encodes calls inline as JSON.

use serde::Deserialize;
use serde_json::Value;

use crate::error::{RelayError, Result};
use crate::llm::types::{Fragment, Message, ToolCall, ToolDescriptor};

#[derive(Debug, Deserialize)]
struct InlineEnvelope {
    #[serde(default)]
    tool_calls: Vec<InlineCall>,
}

#[derive(Debug, Deserialize)]
struct InlineCall {
    #[serde(default)]
    id: String,
    function: InlineFunction,
}

#[derive(Debug, Deserialize)]
struct InlineFunction {
    #[serde(default)]
    name: String,
    #[serde(default)]
    arguments: Value,
}

/// Parse text content as a JSON object carrying a `tool_calls` array.
///
/// ```json
/// {"tool_calls": [{"id": "call_1", "function": {"name": "echo", "arguments": "{}"}}]}
/// ```
///
/// Fails with [`RelayError::Parse`] when the text is not such an object.
/// Calls with an empty name are dropped.
pub fn parse_inline_tool_calls(text: &str) -> Result<Vec<ToolCall>> {
    let trimmed = text.trim();
    if !trimmed.starts_with('{') {
        return Err(RelayError::Parse("content is not a JSON object".to_string()));
    }

    let envelope: InlineEnvelope =
        serde_json::from_str(trimmed).map_err(|e| RelayError::Parse(format!("inline tool calls: {}", e)))?;

    Ok(envelope
        .tool_calls
        .into_iter()
        .filter(|c| !c.function.name.is_empty())
        .map(|c| {
            let arguments = match c.function.arguments {
                Value::String(s) => s,
                Value::Null => String::new(),
                other => other.to_string(),
            };
            ToolCall::new(c.id, c.function.name, arguments)
        })
        .collect())
}

fn inline_or_empty(text: &str) -> Vec<ToolCall> {
    match parse_inline_tool_calls(text) {
        Ok(calls) => calls,
        Err(e) => {
            log::trace!("No inline tool calls: {}", e);
            Vec::new()
        }
    }
}

/// Extract tool calls from a complete message.
///
/// Structured calls win; the inline text parse only runs when the message
/// carries none.
pub fn extract_tool_calls(message: &Message) -> Vec<ToolCall> {
    if !message.tool_calls.is_empty() {
        return message
            .tool_calls
            .iter()
            .filter(|c| !c.name.is_empty())
            .cloned()
            .collect();
    }
    inline_or_empty(&message.content)
}

/// Extract tool calls visible in a single streamed fragment.
///
/// Only deltas that already name their tool count; argument text may still
/// be partial at this point.
pub fn extract_fragment_tool_calls(fragment: &Fragment) -> Vec<ToolCall> {
    if !fragment.tool_calls.is_empty() {
        return fragment
            .tool_calls
            .iter()
            .filter_map(|d| {
                let name = d.name.as_deref().filter(|n| !n.is_empty())?;
                Some(ToolCall::new(d.id.clone().unwrap_or_default(), name, d.arguments.clone()))
            })
            .collect();
    }
    inline_or_empty(&fragment.content)
}

/// Parse raw argument text into a JSON object.
///
/// Empty text yields an empty object; anything that is not an object fails.
pub fn parse_arguments(arguments: &str) -> Result<serde_json::Map<String, Value>> {
    if arguments.trim().is_empty() {
        return Ok(serde_json::Map::new());
    }
    match serde_json::from_str::<Value>(arguments) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(RelayError::Parse(format!("arguments must be a JSON object, got {}", other))),
        Err(e) => Err(RelayError::Parse(format!("arguments: {}", e))),
    }
}

/// Validate a call's arguments against the `required` list of its descriptor
pub fn validate_arguments(call: &ToolCall, descriptor: &ToolDescriptor) -> Result<()> {
    let args = parse_arguments(&call.arguments)?;
    if let Some(required) = descriptor.parameters.get("required").and_then(|r| r.as_array()) {
        for field in required.iter().filter_map(|f| f.as_str()) {
            if !args.contains_key(field) {
                return Err(RelayError::Parse(format!(
                    "Tool '{}' missing required field: {}",
                    call.name, field
                )));
            }
        }
    }
    Ok(())
}
