//! remember_context tool - Store a note for the current conversation

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use super::{Tool, ToolContext, ToolError, parse_input};

pub struct RememberContextTool;

#[derive(Debug, Deserialize)]
struct Input {
    key: String,
    value: String,
}

#[async_trait]
impl Tool for RememberContextTool {
    fn name(&self) -> &str {
        "remember_context"
    }

    fn description(&self) -> &str {
        "Remember a fact about the current conversation so later turns can use it."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "key": {
                    "type": "string",
                    "description": "Short name for the fact"
                },
                "value": {
                    "type": "string",
                    "description": "The fact to remember"
                }
            },
            "required": ["key", "value"]
        })
    }

    async fn invoke(&self, arguments: &str, ctx: &ToolContext) -> Result<String, ToolError> {
        let input: Input = parse_input(arguments)?;
        if input.key.trim().is_empty() {
            return Err(ToolError::MissingField {
                field: "key".to_string(),
            });
        }

        let count = ctx
            .session()
            .update(&ctx.conversation_id, |session| session.set_note(&input.key, &input.value))
            .notes
            .len();
        log::debug!("Remembered '{}' for {}", input.key, ctx.conversation_id);

        Ok(serde_json::json!({"stored": input.key, "notes": count}).to_string())
    }
}
