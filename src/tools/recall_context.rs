//! recall_context tool - Read notes stored for the current conversation

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use super::{Tool, ToolContext, ToolError, parse_input};

pub struct RecallContextTool;

#[derive(Debug, Deserialize)]
struct Input {
    #[serde(default)]
    key: Option<String>,
}

#[async_trait]
impl Tool for RecallContextTool {
    fn name(&self) -> &str {
        "recall_context"
    }

    fn description(&self) -> &str {
        "Recall facts remembered for the current conversation. Omit key to list all."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "key": {
                    "type": "string",
                    "description": "Name of a single fact to recall"
                }
            }
        })
    }

    async fn invoke(&self, arguments: &str, ctx: &ToolContext) -> Result<String, ToolError> {
        let input: Input = parse_input(arguments)?;
        let session = ctx.session().get(&ctx.conversation_id).unwrap_or_default();

        match input.key {
            Some(key) => {
                let value = session
                    .get_note(&key)
                    .ok_or_else(|| ToolError::NotFound(format!("no note named '{}'", key)))?;
                Ok(serde_json::json!({"key": key, "value": value}).to_string())
            }
            None => {
                let notes: serde_json::Map<String, Value> = session
                    .notes
                    .iter()
                    .map(|n| (n.key.clone(), Value::String(n.value.clone())))
                    .collect();
                Ok(Value::Object(notes).to_string())
            }
        }
    }
}
