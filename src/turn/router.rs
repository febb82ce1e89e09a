//! Branch router
//!
//! Peeks at the first fragments of a streamed reply and decides where the
//! turn goes. The peek is bounded by a fragment count and a deadline, and
//! the peeked stream is always released before the route is returned.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::RouterConfig;
use crate::error::RelayError;
use crate::llm::{FragmentStream, ToolCall, extract_fragment_tool_calls};
use crate::tools::ToolRegistry;

/// Where a turn goes after the peek
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// No tool call: hand the model's reply to the caller
    Terminate,
    /// At least one call names a local tool
    LocalTool,
    /// Calls name only tools outside the local registry
    RemoteTool,
}

/// Bound on how much of a stream the router reads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeekBudget {
    pub max_fragments: usize,
    pub timeout: Duration,
}

impl Default for PeekBudget {
    fn default() -> Self {
        Self {
            max_fragments: 1,
            timeout: Duration::from_secs(3),
        }
    }
}

impl From<&RouterConfig> for PeekBudget {
    fn from(config: &RouterConfig) -> Self {
        Self {
            max_fragments: config.peek_max_fragments.max(1),
            timeout: config.peek_timeout(),
        }
    }
}

#[derive(Debug)]
pub struct BranchRouter {
    registry: Arc<ToolRegistry>,
    budget: PeekBudget,
}

impl BranchRouter {
    pub fn new(registry: Arc<ToolRegistry>, budget: PeekBudget) -> Self {
        Self { registry, budget }
    }

    pub fn budget(&self) -> PeekBudget {
        self.budget
    }

    /// Peek at `stream` and classify the turn.
    ///
    /// Stops at the first fragment yielding a tool call, when the budget is
    /// spent, on a receive error or on cancellation. The stream is dropped
    /// before returning on every path.
    pub async fn route(&self, mut stream: FragmentStream, cancel: &CancellationToken) -> Route {
        let deadline = Instant::now() + self.budget.timeout;
        let max_fragments = self.budget.max_fragments.max(1);
        let mut seen = 0;

        let calls = loop {
            if seen >= max_fragments {
                log::debug!("Peek budget of {} fragments spent without a tool call", max_fragments);
                break Vec::new();
            }

            let next = tokio::select! {
                _ = cancel.cancelled() => None,
                item = tokio::time::timeout_at(deadline, stream.recv()) => Some(item),
            };

            match next {
                None => {
                    log::debug!("Peek cancelled by caller");
                    break Vec::new();
                }
                Some(Err(_)) => {
                    log::debug!("Peek timed out after {:?}", self.budget.timeout);
                    break Vec::new();
                }
                Some(Ok(None)) => break Vec::new(),
                Some(Ok(Some(Err(e)))) => {
                    let err = RelayError::Stream(e.to_string());
                    log::warn!("Aborting peek: {}", err);
                    break Vec::new();
                }
                Some(Ok(Some(Ok(fragment)))) => {
                    seen += 1;
                    let calls = extract_fragment_tool_calls(&fragment);
                    if !calls.is_empty() {
                        break calls;
                    }
                }
            }
        };
        drop(stream);

        let route = self.classify(&calls);
        log::debug!("Routed turn to {:?} after {} fragment(s)", route, seen);
        route
    }

    /// Classify extracted calls against the local registry
    pub fn classify(&self, calls: &[ToolCall]) -> Route {
        if calls.is_empty() {
            Route::Terminate
        } else if calls.iter().any(|c| self.registry.contains(&c.name)) {
            Route::LocalTool
        } else {
            Route::RemoteTool
        }
    }
}
