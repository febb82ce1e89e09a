//! Scripted in-memory providers for tests and offline runs

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};

use super::protocol::{Connector, ProviderConnection, ProviderSpec, ToolCallEnvelope};
use crate::error::{RelayError, Result};
use crate::llm::ToolDescriptor;

/// Counter that a scripted behaviour consumes one unit at a time
fn take_one(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

/// Scripted answer to a call
#[derive(Debug, Clone)]
enum Scripted {
    /// Wrapped in a single-text-block envelope
    Text(String),
    /// Returned as-is, envelope or not
    Raw(String),
    Failure(String),
}

/// Behaviour script for one named provider
pub struct MockProvider {
    name: String,
    tools: Vec<ToolDescriptor>,
    results: HashMap<String, Scripted>,
    connect_failures: AtomicUsize,
    empty_discoveries: AtomicUsize,
    call_delay: Option<Duration>,
    connects: AtomicUsize,
    closes: AtomicUsize,
    calls: Mutex<Vec<(String, Map<String, Value>)>>,
}

impl MockProvider {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tools: Vec::new(),
            results: HashMap::new(),
            connect_failures: AtomicUsize::new(0),
            empty_discoveries: AtomicUsize::new(0),
            call_delay: None,
            connects: AtomicUsize::new(0),
            closes: AtomicUsize::new(0),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Expose a tool with an empty object schema
    pub fn with_tool(mut self, name: impl Into<String>, description: impl Into<String>) -> Self {
        self.tools.push(ToolDescriptor::new(
            name,
            description,
            serde_json::json!({"type": "object", "properties": {}}),
        ));
        self
    }

    /// Answer calls to `tool` with a single text block
    pub fn with_result(mut self, tool: impl Into<String>, text: impl Into<String>) -> Self {
        self.results.insert(tool.into(), Scripted::Text(text.into()));
        self
    }

    /// Answer calls to `tool` with `raw` verbatim instead of an envelope
    pub fn with_raw_result(mut self, tool: impl Into<String>, raw: impl Into<String>) -> Self {
        self.results.insert(tool.into(), Scripted::Raw(raw.into()));
        self
    }

    /// Fail calls to `tool`
    pub fn with_failure(mut self, tool: impl Into<String>, message: impl Into<String>) -> Self {
        self.results.insert(tool.into(), Scripted::Failure(message.into()));
        self
    }

    /// Fail the next `n` connection attempts
    pub fn failing_connects(self, n: usize) -> Self {
        self.connect_failures.store(n, Ordering::SeqCst);
        self
    }

    /// The next `n` connections discover no tools
    pub fn empty_discoveries(self, n: usize) -> Self {
        self.empty_discoveries.store(n, Ordering::SeqCst);
        self
    }

    /// Delay every call, for cancellation tests
    pub fn with_call_delay(mut self, delay: Duration) -> Self {
        self.call_delay = Some(delay);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Successful connections so far
    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    /// Calls received so far, as (tool, arguments)
    pub fn calls(&self) -> Vec<(String, Map<String, Value>)> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

/// Connector over a fixed set of [`MockProvider`]s, matched by name
#[derive(Default)]
pub struct MockConnector {
    providers: HashMap<String, Arc<MockProvider>>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_provider(mut self, provider: MockProvider) -> Self {
        self.providers.insert(provider.name.clone(), Arc::new(provider));
        self
    }

    pub fn provider(&self, name: &str) -> Option<Arc<MockProvider>> {
        self.providers.get(name).cloned()
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, spec: &ProviderSpec) -> Result<Arc<dyn ProviderConnection>> {
        let provider = self
            .providers
            .get(&spec.name)
            .cloned()
            .ok_or_else(|| RelayError::Connect(format!("no mock provider named '{}'", spec.name)))?;

        if take_one(&provider.connect_failures) {
            return Err(RelayError::Connect(format!("{}: connection refused", spec.name)));
        }

        provider.connects.fetch_add(1, Ordering::SeqCst);
        let empty = take_one(&provider.empty_discoveries);
        Ok(Arc::new(MockConnection {
            provider,
            empty,
            closed: AtomicBool::new(false),
        }))
    }
}

struct MockConnection {
    provider: Arc<MockProvider>,
    empty: bool,
    closed: AtomicBool,
}

#[async_trait]
impl ProviderConnection for MockConnection {
    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(RelayError::Connect("connection is closed".to_string()));
        }
        if self.empty {
            return Ok(Vec::new());
        }
        Ok(self.provider.tools.clone())
    }

    async fn call_tool(&self, name: &str, arguments: Map<String, Value>) -> Result<String> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(RelayError::Connect("connection is closed".to_string()));
        }
        self.provider
            .calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((name.to_string(), arguments.clone()));

        if let Some(delay) = self.provider.call_delay {
            tokio::time::sleep(delay).await;
        }

        match self.provider.results.get(name) {
            Some(Scripted::Text(text)) => Ok(ToolCallEnvelope::text(text.clone()).to_json()),
            Some(Scripted::Raw(raw)) => Ok(raw.clone()),
            Some(Scripted::Failure(message)) => Err(RelayError::Invocation(message.clone())),
            None => Ok(ToolCallEnvelope::text(Value::Object(arguments).to_string()).to_json()),
        }
    }

    async fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.provider.closes.fetch_add(1, Ordering::SeqCst);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProviderConfig;

    fn spec(name: &str) -> ProviderSpec {
        ProviderSpec::from_config(&ProviderConfig::new(name, "mock://"), Duration::from_secs(1))
    }

    #[tokio::test]
    async fn test_scripted_connect_failures() {
        let connector = MockConnector::new().with_provider(MockProvider::new("a").failing_connects(1));
        assert!(connector.connect(&spec("a")).await.is_err());
        assert!(connector.connect(&spec("a")).await.is_ok());
        assert_eq!(connector.provider("a").unwrap().connect_count(), 1);
    }

    #[tokio::test]
    async fn test_unknown_provider() {
        let connector = MockConnector::new();
        assert!(matches!(connector.connect(&spec("x")).await, Err(RelayError::Connect(_))));
    }

    #[tokio::test]
    async fn test_call_results() {
        let connector = MockConnector::new().with_provider(
            MockProvider::new("a")
                .with_tool("ok", "")
                .with_result("ok", "fine")
                .with_failure("bad", "broken"),
        );
        let conn = connector.connect(&spec("a")).await.unwrap();

        let raw = conn.call_tool("ok", Map::new()).await.unwrap();
        let envelope: ToolCallEnvelope = serde_json::from_str(&raw).unwrap();
        assert_eq!(envelope.first_text(), Some("fine"));
        assert!(conn.call_tool("bad", Map::new()).await.is_err());
        assert_eq!(connector.provider("a").unwrap().calls().len(), 2);
    }

    #[tokio::test]
    async fn test_empty_discovery_then_tools() {
        let connector = MockConnector::new().with_provider(MockProvider::new("a").with_tool("t", "").empty_discoveries(1));
        let first = connector.connect(&spec("a")).await.unwrap();
        let second = connector.connect(&spec("a")).await.unwrap();
        assert!(first.list_tools().await.unwrap().is_empty());
        assert_eq!(second.list_tools().await.unwrap().len(), 1);
    }
}
