//! Application context
//!
//! `Agent` owns the registry, provider pool, session cache and turn
//! pipeline, plus the health task that repairs the pool.
//! It turns chat requests into turns.

mod chat;

pub use chat::{ChatReply, ChatRequest, DEFAULT_QUERY, ToolInfo, ToolKind, trim_history};

use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::error::Result;
use crate::llm::ChatModel;
use crate::remote::{Connector, ProviderPool};
use crate::session::SessionCache;
use crate::tools::ToolRegistry;
use crate::turn::{PeekBudget, PipelineOptions, PromptTemplate, TurnContext, TurnPipeline, TurnReply};

pub struct Agent {
    config: Config,
    registry: Arc<ToolRegistry>,
    pool: Arc<ProviderPool>,
    cache: Arc<SessionCache>,
    pipeline: TurnPipeline,
    cancel: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Agent {
    /// Wire everything up and start the background tasks
    pub async fn start(config: Config, model: Arc<dyn ChatModel>, connector: Arc<dyn Connector>) -> Result<Self> {
        let registry = Arc::new(ToolRegistry::with_builtin_tools()?);
        log::info!("Registered {} local tools", registry.len());

        let pool = Arc::new(ProviderPool::new(config.providers.clone(), connector));
        pool.initialize().await?;

        let cache = Arc::new(SessionCache::with_capacity(config.session.ttl(), config.session.max_sessions));
        let options = PipelineOptions {
            budget: PeekBudget::from(&config.router),
            template: PromptTemplate::new(),
            max_tokens: Some(config.llm.max_tokens),
            session: Arc::clone(&cache),
        };

        let pipeline = match TurnPipeline::new(model, Arc::clone(&registry), Arc::clone(&pool), options).await {
            Ok(pipeline) => pipeline,
            Err(e) => {
                log::error!("Failed to build turn pipeline: {}", e);
                pool.close().await;
                return Err(e);
            }
        };

        let cancel = CancellationToken::new();
        let mut tasks = Vec::new();
        if pool.is_enabled() {
            tasks.push(pool.spawn_health_checker(cancel.clone()));
        }

        Ok(Self {
            config,
            registry,
            pool,
            cache,
            pipeline,
            cancel,
            tasks: Mutex::new(tasks),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    pub fn pool(&self) -> &Arc<ProviderPool> {
        &self.pool
    }

    pub fn cache(&self) -> &Arc<SessionCache> {
        &self.cache
    }

    pub fn pipeline(&self) -> &TurnPipeline {
        &self.pipeline
    }

    /// Build the turn for a request: query, trimmed history, session notes
    pub fn turn_for(&self, request: &ChatRequest) -> TurnContext {
        let (query, history) = request.split();
        let mut history = trim_history(history, self.config.chat.max_history_length);

        let conversation_id = request.conversation_key();
        if let Some(session) = self.cache.get(conversation_id) {
            history.extend(session.to_messages());
        }

        TurnContext::new(conversation_id, query)
            .with_system_prompt(&self.config.chat.system_prompt)
            .with_history(history)
    }

    /// Run a request as a streamed turn, leaving the reply unconsumed
    pub async fn chat_stream(&self, request: &ChatRequest, cancel: &CancellationToken) -> Result<TurnReply> {
        let turn = self.turn_for(request);
        log::info!("Streaming turn for conversation '{}'", turn.conversation_id);
        self.pipeline.stream(&turn, cancel).await
    }

    /// Run a request to completion
    pub async fn chat(&self, request: ChatRequest, cancel: &CancellationToken) -> Result<ChatReply> {
        let message = if request.stream {
            self.chat_stream(&request, cancel).await?.into_message(cancel).await?
        } else {
            let turn = self.turn_for(&request);
            log::info!("Invoking turn for conversation '{}'", turn.conversation_id);
            self.pipeline.invoke(&turn, cancel).await?
        };

        let model = if request.model.is_empty() {
            self.config.llm.model.clone()
        } else {
            request.model
        };

        Ok(ChatReply {
            id: request.id,
            created: Utc::now(),
            model,
            message,
        })
    }

    /// Every tool bound to the model, local first
    pub fn tools_info(&self) -> Vec<ToolInfo> {
        self.pipeline
            .bound_tools()
            .iter()
            .map(|d| ToolInfo {
                name: d.name.clone(),
                description: d.description.clone(),
                kind: if self.registry.contains(&d.name) {
                    ToolKind::Local
                } else {
                    ToolKind::Remote
                },
            })
            .collect()
    }

    /// Stop background tasks and close every provider connection
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let tasks: Vec<_> = self
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        for task in tasks {
            if let Err(e) = task.await {
                log::warn!("Background task ended abnormally: {}", e);
            }
        }
        self.pool.close().await;
        log::info!("Agent shut down");
    }
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("pipeline", &self.pipeline)
            .field("registry", &self.registry)
            .finish()
    }
}
