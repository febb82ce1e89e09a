//! JSON-RPC over HTTP provider connector
//!
//! Each request is a POST to the provider endpoint. Replies come back either
//! as a plain JSON body or as a short `text/event-stream` carrying the
//! response in a `data:` line. A session id handed out during the handshake
//! is echoed on every later request.

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde_json::{Map, Value, json};

use super::protocol::{
    Connector, JsonRpcRequest, JsonRpcResponse, ListToolsResult, ProviderConnection, ProviderSpec, ToolCallEnvelope,
    initialize_params,
};
use crate::error::{RelayError, Result};
use crate::llm::ToolDescriptor;

/// Header carrying the provider-assigned session id
pub const SESSION_HEADER: &str = "Mcp-Session-Id";

/// Connector that opens [`HttpConnection`]s
#[derive(Debug, Default, Clone)]
pub struct HttpConnector;

impl HttpConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Connector for HttpConnector {
    async fn connect(&self, spec: &ProviderSpec) -> Result<Arc<dyn ProviderConnection>> {
        let connection = HttpConnection::open(spec).await?;
        Ok(Arc::new(connection))
    }
}

/// One handshaken HTTP provider connection
pub struct HttpConnection {
    name: String,
    endpoint: String,
    client: Client,
    next_id: AtomicI64,
    session_id: Mutex<Option<String>>,
    closed: AtomicBool,
}

impl HttpConnection {
    /// Connect and run the initialize handshake
    pub async fn open(spec: &ProviderSpec) -> Result<Self> {
        if spec.url.is_empty() {
            return Err(RelayError::Connect(format!("provider '{}' has no url", spec.name)));
        }

        let client = Client::builder()
            .timeout(spec.timeout)
            .build()
            .map_err(|e| RelayError::Connect(format!("Failed to create HTTP client: {}", e)))?;

        let connection = Self {
            name: spec.name.clone(),
            endpoint: spec.url.clone(),
            client,
            next_id: AtomicI64::new(1),
            session_id: Mutex::new(None),
            closed: AtomicBool::new(false),
        };

        let result = connection
            .send_request("initialize", Some(initialize_params(spec)))
            .await
            .map_err(|e| RelayError::Connect(format!("initialize '{}': {}", spec.name, e)))?;
        log::debug!(
            "Provider '{}' initialized (protocol {})",
            spec.name,
            result["protocolVersion"].as_str().unwrap_or("unknown")
        );

        if let Err(e) = connection.notify("notifications/initialized").await {
            connection.close().await;
            return Err(RelayError::Connect(format!(
                "initialized notification '{}': {}",
                spec.name, e
            )));
        }

        Ok(connection)
    }

    fn session_id(&self) -> Option<String> {
        self.session_id.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(RelayError::Connect(format!("provider '{}' connection is closed", self.name)));
        }
        Ok(())
    }

    fn post(&self, body: &JsonRpcRequest) -> reqwest::RequestBuilder {
        let mut request = self
            .client
            .post(&self.endpoint)
            .header(ACCEPT, "application/json, text/event-stream")
            .json(body);
        if let Some(session) = self.session_id() {
            request = request.header(SESSION_HEADER, session);
        }
        request
    }

    async fn send_request(&self, method: &str, params: Option<Value>) -> Result<Value> {
        self.ensure_open()?;
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let request = JsonRpcRequest::new(id, method, params);

        let response = self
            .post(&request)
            .send()
            .await
            .map_err(|e| RelayError::Connect(format!("HTTP request failed: {}", e)))?;

        if let Some(session) = response.headers().get(SESSION_HEADER).and_then(|v| v.to_str().ok()) {
            *self.session_id.lock().unwrap_or_else(PoisonError::into_inner) = Some(session.to_string());
        }

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RelayError::Connect(format!("HTTP error: {} - {}", status, body)));
        }

        let is_event_stream = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.starts_with("text/event-stream"));
        let body = response
            .text()
            .await
            .map_err(|e| RelayError::Connect(format!("Failed to read response: {}", e)))?;

        let rpc = if is_event_stream {
            decode_event_stream(&body, id)?
        } else {
            serde_json::from_str::<JsonRpcResponse>(&body)
                .map_err(|e| RelayError::Parse(format!("Failed to parse JSON-RPC response: {}", e)))?
        };

        if let Some(error) = rpc.error {
            return Err(RelayError::Invocation(format!("{} (code {})", error.message, error.code)));
        }
        rpc.result
            .ok_or_else(|| RelayError::Parse(format!("response to '{}' has neither result nor error", method)))
    }

    async fn notify(&self, method: &str) -> Result<()> {
        self.ensure_open()?;
        let response = self
            .post(&JsonRpcRequest::notification(method))
            .send()
            .await
            .map_err(|e| RelayError::Connect(format!("HTTP request failed: {}", e)))?;
        if !response.status().is_success() {
            return Err(RelayError::Connect(format!("HTTP error: {}", response.status())));
        }
        Ok(())
    }
}

/// Find the JSON-RPC response for `id` among the events of an SSE body
fn decode_event_stream(body: &str, id: i64) -> Result<JsonRpcResponse> {
    let mut data = String::new();
    let mut events = Vec::new();
    for line in body.lines() {
        if line.is_empty() {
            if !data.is_empty() {
                events.push(std::mem::take(&mut data));
            }
        } else if let Some(rest) = line.strip_prefix("data:") {
            if !data.is_empty() {
                data.push('\n');
            }
            data.push_str(rest.trim_start());
        }
    }
    if !data.is_empty() {
        events.push(data);
    }

    events
        .iter()
        .filter_map(|e| serde_json::from_str::<JsonRpcResponse>(e).ok())
        .find(|r| r.answers(id))
        .ok_or_else(|| RelayError::Parse(format!("no response for request {} in event stream", id)))
}

#[async_trait]
impl ProviderConnection for HttpConnection {
    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>> {
        let mut tools = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let params = match &cursor {
                Some(c) => json!({"cursor": c}),
                None => json!({}),
            };
            let result = self.send_request("tools/list", Some(params)).await?;
            let page: ListToolsResult = serde_json::from_value(result)
                .map_err(|e| RelayError::Parse(format!("tools/list result: {}", e)))?;
            tools.extend(page.tools.into_iter().map(ToolDescriptor::from));
            match page.next_cursor {
                Some(next) if !next.is_empty() => cursor = Some(next),
                _ => break,
            }
        }
        Ok(tools)
    }

    async fn call_tool(&self, name: &str, arguments: Map<String, Value>) -> Result<String> {
        let result = self
            .send_request("tools/call", Some(json!({"name": name, "arguments": arguments})))
            .await?;

        let envelope: ToolCallEnvelope = serde_json::from_value(result.clone())
            .map_err(|e| RelayError::Parse(format!("tools/call result: {}", e)))?;
        if envelope.is_error {
            let message = envelope.first_text().unwrap_or("tool reported an error");
            return Err(RelayError::Invocation(format!("{}: {}", name, message)));
        }

        Ok(serde_json::to_string(&result)?)
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(session) = self.session_id() {
            let result = self
                .client
                .delete(&self.endpoint)
                .header(SESSION_HEADER, session)
                .send()
                .await;
            if let Err(e) = result {
                log::debug!("Closing session for provider '{}' failed: {}", self.name, e);
            }
        }
    }
}

impl std::fmt::Debug for HttpConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpConnection")
            .field("name", &self.name)
            .field("endpoint", &self.endpoint)
            .field("closed", &self.closed.load(Ordering::SeqCst))
            .finish()
    }
}
