//! Remote tool provider protocol
//!
//! The connector and connection traits the pool is written against, plus the
//! JSON-RPC 2.0 message types spoken by tool providers.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config::ProviderConfig;
use crate::error::Result;
use crate::llm::ToolDescriptor;

/// Protocol revision sent in the initialize handshake
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// Version reported in the client identity
pub const CLIENT_VERSION: &str = "1.0.0";

/// Everything needed to open one provider connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderSpec {
    pub name: String,
    pub url: String,
    pub description: String,
    pub timeout: Duration,
}

impl ProviderSpec {
    pub fn from_config(config: &ProviderConfig, timeout: Duration) -> Self {
        Self {
            name: config.name.clone(),
            url: config.url.clone(),
            description: config.description.clone(),
            timeout,
        }
    }

    /// Client identity announced during the handshake
    pub fn client_name(&self) -> String {
        format!("relay-{}", self.name)
    }
}

/// Opens connections to tool providers.
///
/// `connect` returns only after the handshake completed.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, spec: &ProviderSpec) -> Result<Arc<dyn ProviderConnection>>;
}

/// A live, handshaken provider connection
#[async_trait]
pub trait ProviderConnection: Send + Sync {
    /// Discover the tools the provider exposes
    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>>;

    /// Invoke a tool, returning the raw result as JSON text
    async fn call_tool(&self, name: &str, arguments: Map<String, Value>) -> Result<String>;

    /// Release the connection; calling it twice is harmless
    async fn close(&self);
}

/// JSON-RPC request or notification (no id)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    pub fn new(id: i64, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: Some(id),
            method: method.into(),
            params,
        }
    }

    pub fn notification(method: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: None,
            method: method.into(),
            params: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    #[serde(default)]
    pub jsonrpc: String,
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    /// Whether this response answers the request with `id`
    pub fn answers(&self, id: i64) -> bool {
        self.id.as_ref().and_then(Value::as_i64) == Some(id)
    }
}

/// Parameters of the initialize handshake
pub fn initialize_params(spec: &ProviderSpec) -> Value {
    serde_json::json!({
        "protocolVersion": PROTOCOL_VERSION,
        "capabilities": {},
        "clientInfo": {
            "name": spec.client_name(),
            "version": CLIENT_VERSION,
        }
    })
}

/// Tool as listed by `tools/list`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteToolDefinition {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, rename = "inputSchema")]
    pub input_schema: Option<Value>,
}

impl From<RemoteToolDefinition> for ToolDescriptor {
    fn from(def: RemoteToolDefinition) -> Self {
        ToolDescriptor::new(
            def.name,
            def.description.unwrap_or_default(),
            def.input_schema
                .unwrap_or_else(|| serde_json::json!({"type": "object", "properties": {}})),
        )
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListToolsResult {
    #[serde(default)]
    pub tools: Vec<RemoteToolDefinition>,
    #[serde(default, rename = "nextCursor", skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

/// One block of a tool result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentBlock {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl ContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            kind: "text".to_string(),
            text: Some(text.into()),
        }
    }
}

/// Result of `tools/call`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolCallEnvelope {
    #[serde(default)]
    pub content: Vec<ContentBlock>,
    #[serde(default, rename = "isError")]
    pub is_error: bool,
}

impl ToolCallEnvelope {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ContentBlock::text(text)],
            is_error: false,
        }
    }

    /// Text of the first block, if it carries any
    pub fn first_text(&self) -> Option<&str> {
        self.content.first().and_then(|b| b.text.as_deref())
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> ProviderSpec {
        ProviderSpec::from_config(
            &ProviderConfig::new("weather", "http://localhost:9001/mcp"),
            Duration::from_secs(5),
        )
    }

    #[test]
    fn test_client_identity() {
        let params = initialize_params(&spec());
        assert_eq!(params["clientInfo"]["name"], "relay-weather");
        assert_eq!(params["clientInfo"]["version"], CLIENT_VERSION);
        assert_eq!(params["protocolVersion"], PROTOCOL_VERSION);
    }

    #[test]
    fn test_notification_has_no_id() {
        let json = serde_json::to_value(JsonRpcRequest::notification("notifications/initialized")).unwrap();
        assert!(json.get("id").is_none());
        assert_eq!(json["jsonrpc"], "2.0");
    }

    #[test]
    fn test_response_answers_id() {
        let resp: JsonRpcResponse = serde_json::from_str(r#"{"jsonrpc":"2.0","id":3,"result":{}}"#).unwrap();
        assert!(resp.answers(3));
        assert!(!resp.answers(4));
    }

    #[test]
    fn test_remote_definition_to_descriptor() {
        let list: ListToolsResult = serde_json::from_str(
            r#"{"tools":[{"name":"forecast","description":"Weather","inputSchema":{"type":"object","required":["city"]}},{"name":"bare"}]}"#,
        )
        .unwrap();
        let descriptors: Vec<ToolDescriptor> = list.tools.into_iter().map(Into::into).collect();
        assert_eq!(descriptors[0].name, "forecast");
        assert_eq!(descriptors[0].parameters["required"][0], "city");
        assert_eq!(descriptors[1].description, "");
        assert_eq!(descriptors[1].parameters["type"], "object");
    }

    #[test]
    fn test_envelope_first_text() {
        let envelope: ToolCallEnvelope =
            serde_json::from_str(r#"{"content":[{"type":"text","text":"sunny"},{"type":"text","text":"x"}]}"#).unwrap();
        assert_eq!(envelope.first_text(), Some("sunny"));
        assert!(!envelope.is_error);
        assert_eq!(ToolCallEnvelope::default().first_text(), None);
    }

    #[test]
    fn test_envelope_serializes_is_error_camel_case() {
        let json = ToolCallEnvelope::text("ok").to_json();
        assert!(json.contains("\"isError\":false"));
    }
}
