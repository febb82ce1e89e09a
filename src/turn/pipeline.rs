//! Turn pipeline
//!
//! prompt -> model -> (streamed) router -> dispatcher. Built once, shared
//! immutably across concurrent turns; per-turn data travels as arguments.

use std::collections::HashSet;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use super::context::TurnContext;
use super::dispatch::ToolDispatcher;
use super::prompt::PromptTemplate;
use super::router::{BranchRouter, PeekBudget, Route};
use crate::error::{RelayError, Result};
use crate::llm::{ChatModel, CompletionRequest, FragmentStream, LlmError, Message, ToolDescriptor};
use crate::remote::ProviderPool;
use crate::session::SessionCache;
use crate::tools::{ToolContext, ToolRegistry};

/// Fragments buffered for the caller while the router peeks
const DEFAULT_STREAM_BUFFER: usize = 64;

/// Construction-time options for [`TurnPipeline`]
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub budget: PeekBudget,
    pub template: PromptTemplate,
    pub max_tokens: Option<u32>,
    /// Cache handed to local tools through their context
    pub session: Arc<SessionCache>,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            budget: PeekBudget::default(),
            template: PromptTemplate::new(),
            max_tokens: None,
            session: Arc::new(SessionCache::default()),
        }
    }
}

/// Result of a streamed turn
#[derive(Debug)]
pub enum TurnReply {
    /// No tool was called; the model's own reply, replayed from the start
    Stream(FragmentStream),
    /// A tool ran; the synthesized result message
    Message(Message),
}

impl TurnReply {
    pub fn is_stream(&self) -> bool {
        matches!(self, TurnReply::Stream(_))
    }

    /// Collect the reply into a single message
    pub async fn into_message(self, cancel: &CancellationToken) -> Result<Message> {
        match self {
            TurnReply::Stream(stream) => Ok(stream.collect(cancel).await?),
            TurnReply::Message(message) => Ok(message),
        }
    }
}

pub struct TurnPipeline {
    model: Arc<dyn ChatModel>,
    template: PromptTemplate,
    tools: Vec<ToolDescriptor>,
    router: BranchRouter,
    dispatcher: ToolDispatcher,
    session: Arc<SessionCache>,
    max_tokens: Option<u32>,
    stream_buffer: usize,
}

impl TurnPipeline {
    /// Validate inputs and freeze the tool binding.
    ///
    /// Local descriptors come first; a remote tool sharing a local name, or
    /// an earlier remote name, is dropped.
    pub async fn new(
        model: Arc<dyn ChatModel>,
        registry: Arc<ToolRegistry>,
        pool: Arc<ProviderPool>,
        options: PipelineOptions,
    ) -> Result<Self> {
        if model.model_id().trim().is_empty() {
            return Err(RelayError::Pipeline("model id must not be empty".to_string()));
        }
        if options.budget.max_fragments == 0 {
            return Err(RelayError::Pipeline("peek budget must allow at least one fragment".to_string()));
        }
        if options.budget.timeout.is_zero() {
            return Err(RelayError::Pipeline("peek timeout must be greater than zero".to_string()));
        }

        let mut tools = registry.descriptors();
        let mut seen: HashSet<String> = tools.iter().map(|d| d.name.clone()).collect();
        for descriptor in pool.descriptors().await {
            if registry.contains(&descriptor.name) {
                tracing::warn!(tool = %descriptor.name, "Remote tool shadowed by local tool, not bound");
                continue;
            }
            if !seen.insert(descriptor.name.clone()) {
                tracing::debug!(tool = %descriptor.name, "Duplicate remote tool, keeping first provider's");
                continue;
            }
            tools.push(descriptor);
        }
        tracing::info!(model = model.model_id(), tools = tools.len(), "Turn pipeline ready");

        Ok(Self {
            stream_buffer: DEFAULT_STREAM_BUFFER.max(options.budget.max_fragments + 1),
            router: BranchRouter::new(Arc::clone(&registry), options.budget),
            dispatcher: ToolDispatcher::new(registry, pool),
            model,
            template: options.template,
            tools,
            session: options.session,
            max_tokens: options.max_tokens,
        })
    }

    pub fn model_id(&self) -> &str {
        self.model.model_id()
    }

    /// Descriptors bound to every model request
    pub fn bound_tools(&self) -> &[ToolDescriptor] {
        &self.tools
    }

    fn request(&self, turn: &TurnContext) -> CompletionRequest {
        let mut request = CompletionRequest::new(self.model.model_id())
            .with_messages(self.template.render(turn))
            .with_tools(self.tools.clone());
        if let Some(max_tokens) = self.max_tokens {
            request = request.with_max_tokens(max_tokens);
        }
        request
    }

    /// Whole-message turn: the model reply verbatim, no routing
    pub async fn invoke(&self, turn: &TurnContext, cancel: &CancellationToken) -> Result<Message> {
        let request = self.request(turn);
        tokio::select! {
            _ = cancel.cancelled() => Err(LlmError::Cancelled.into()),
            reply = self.model.complete(request) => Ok(reply?),
        }
    }

    /// Streamed turn: peek, route, and either replay or dispatch
    pub async fn stream(&self, turn: &TurnContext, cancel: &CancellationToken) -> Result<TurnReply> {
        let request = self.request(turn);
        let source = tokio::select! {
            _ = cancel.cancelled() => return Err(LlmError::Cancelled.into()),
            stream = self.model.stream(request) => stream?,
        };

        let (primary, branch) = source.fork(self.stream_buffer);
        let route = self.router.route(branch, cancel).await;
        tracing::info!(conversation = %turn.conversation_id, route = ?route, "Turn routed");

        match route {
            Route::Terminate => Ok(TurnReply::Stream(primary)),
            Route::LocalTool => {
                let message = primary.collect(cancel).await?;
                let ctx = ToolContext::new(turn.conversation_id.clone(), Arc::clone(&self.session));
                Ok(TurnReply::Message(self.dispatcher.dispatch_local(message, &ctx).await))
            }
            Route::RemoteTool => {
                let message = primary.collect(cancel).await?;
                Ok(TurnReply::Message(self.dispatcher.dispatch_remote(message, cancel).await))
            }
        }
    }
}

impl std::fmt::Debug for TurnPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TurnPipeline")
            .field("model", &self.model.model_id())
            .field("tools", &self.tools.len())
            .field("budget", &self.router.budget())
            .finish()
    }
}
