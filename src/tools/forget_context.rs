//! forget_context tool - Drop one note or the whole conversation context

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use super::{Tool, ToolContext, ToolError, parse_input};

pub struct ForgetContextTool;

#[derive(Debug, Deserialize)]
struct Input {
    #[serde(default)]
    key: Option<String>,
}

#[async_trait]
impl Tool for ForgetContextTool {
    fn name(&self) -> &str {
        "forget_context"
    }

    fn description(&self) -> &str {
        "Forget a remembered fact, or everything remembered for this conversation when key is omitted."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "key": {
                    "type": "string",
                    "description": "Name of the fact to forget"
                }
            }
        })
    }

    async fn invoke(&self, arguments: &str, ctx: &ToolContext) -> Result<String, ToolError> {
        let input: Input = parse_input(arguments)?;
        let removed = match &input.key {
            Some(key) => {
                let mut removed = false;
                ctx.session()
                    .update(&ctx.conversation_id, |s| removed = s.remove_note(key));
                removed
            }
            None => ctx.session().delete(&ctx.conversation_id),
        };
        Ok(serde_json::json!({"forgot": input.key.as_deref().unwrap_or("*"), "removed": removed}).to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionCache;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_forget_single_note() {
        let cache = Arc::new(SessionCache::default());
        cache.update("conv-1", |s| {
            s.set_note("a", "1");
            s.set_note("b", "2");
        });
        let ctx = ToolContext::new("conv-1", Arc::clone(&cache));

        let result = ForgetContextTool.invoke(r#"{"key":"a"}"#, &ctx).await.unwrap();
        let parsed: Value = serde_json::from_str(&result).unwrap();
        assert_eq!(parsed["removed"], true);

        let session = cache.get("conv-1").unwrap();
        assert_eq!(session.notes.len(), 1);
        assert_eq!(session.get_note("b"), Some("2"));
    }

    #[tokio::test]
    async fn test_forget_everything() {
        let cache = Arc::new(SessionCache::default());
        cache.update("conv-1", |s| s.set_note("a", "1"));
        let ctx = ToolContext::new("conv-1", Arc::clone(&cache));

        let result = ForgetContextTool.invoke("{}", &ctx).await.unwrap();
        let parsed: Value = serde_json::from_str(&result).unwrap();
        assert_eq!(parsed["forgot"], "*");
        assert!(cache.get("conv-1").is_none());
    }
}
