//! Remote connection pool
//!
//! Keeps one connection per configured provider, a pool-wide table of the
//! tools they expose (keyed `provider.tool`) and a health loop that repairs
//! providers which lost their tools. The state lock is never held across a
//! network call: snapshots are taken under a read lock and results are
//! installed under a write lock.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde::Serialize;
use serde_json::Map;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::protocol::{Connector, ProviderConnection, ProviderSpec};
use crate::config::{ProviderConfig, ProvidersConfig};
use crate::error::{RelayError, Result};
use crate::llm::{ToolDescriptor, parse_arguments};

/// A connected provider
#[derive(Clone)]
pub struct ProviderEntry {
    pub name: String,
    pub endpoint: String,
    pub description: String,
    pub connection: Arc<dyn ProviderConnection>,
    /// Tools found by the last successful discovery
    pub tools: Vec<ToolDescriptor>,
    /// Position in configuration; lower ranks are tried first
    pub rank: usize,
}

impl std::fmt::Debug for ProviderEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderEntry")
            .field("name", &self.name)
            .field("endpoint", &self.endpoint)
            .field("tools", &self.tools.len())
            .field("rank", &self.rank)
            .finish()
    }
}

/// Summary of one provider for listings
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderStatus {
    pub name: String,
    pub endpoint: String,
    pub description: String,
    pub tools: usize,
}

#[derive(Debug, Clone)]
struct RemoteTool {
    provider: String,
    descriptor: ToolDescriptor,
}

#[derive(Debug, Default)]
struct PoolState {
    providers: HashMap<String, ProviderEntry>,
    tools: HashMap<String, RemoteTool>,
}

impl PoolState {
    fn ranked(&self) -> Vec<&ProviderEntry> {
        let mut entries: Vec<_> = self.providers.values().collect();
        entries.sort_by_key(|e| e.rank);
        entries
    }
}

/// Named provider connections plus their namespaced tool table
pub struct ProviderPool {
    config: ProvidersConfig,
    connector: Arc<dyn Connector>,
    state: RwLock<PoolState>,
}

impl ProviderPool {
    pub fn new(config: ProvidersConfig, connector: Arc<dyn Connector>) -> Self {
        Self {
            config,
            connector,
            state: RwLock::new(PoolState::default()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Connect every enabled provider; failures are logged and skipped
    pub async fn initialize(&self) -> Result<()> {
        if !self.config.enabled {
            tracing::info!("Remote tool providers are disabled in configuration");
            return Ok(());
        }

        for (rank, provider) in self.config.clients.iter().enumerate() {
            if !provider.enabled {
                tracing::info!(provider = %provider.name, "Provider is disabled, skipping");
                continue;
            }

            tracing::info!(provider = %provider.name, url = %provider.url, "Initializing provider");
            match self.connect_provider(rank, provider).await {
                Ok(connection) => {
                    tracing::info!(provider = %provider.name, "Connected to provider");
                    self.register_tools(&provider.name, &connection).await;
                }
                Err(e) => {
                    tracing::warn!(provider = %provider.name, error = %e, "Failed to connect to provider");
                }
            }
        }

        let state = self.state.read().await;
        tracing::info!(
            providers = state.providers.len(),
            tools = state.tools.len(),
            "Provider initialization complete"
        );
        Ok(())
    }

    /// Connect one provider and install it with no tools yet
    async fn connect_provider(&self, rank: usize, provider: &ProviderConfig) -> Result<Arc<dyn ProviderConnection>> {
        let spec = ProviderSpec::from_config(provider, self.config.request_timeout());
        let connection = self.connector.connect(&spec).await?;

        let displaced = {
            let mut state = self.state.write().await;
            state.tools.retain(|_, t| t.provider != provider.name);
            state.providers.insert(
                provider.name.clone(),
                ProviderEntry {
                    name: provider.name.clone(),
                    endpoint: provider.url.clone(),
                    description: provider.description.clone(),
                    connection: Arc::clone(&connection),
                    tools: Vec::new(),
                    rank,
                },
            )
        };

        if let Some(old) = displaced {
            tracing::debug!(provider = %provider.name, "Closing replaced connection");
            old.connection.close().await;
        }
        Ok(connection)
    }

    /// Discover a provider's tools and register them as `provider.tool`.
    ///
    /// A failed discovery leaves the provider registered with zero tools.
    async fn register_tools(&self, name: &str, connection: &Arc<dyn ProviderConnection>) {
        let discovered = match connection.list_tools().await {
            Ok(tools) => tools,
            Err(e) => {
                tracing::warn!(provider = %name, error = %e, "Failed to get tools from provider");
                return;
            }
        };

        let mut state = self.state.write().await;
        match state.providers.get_mut(name) {
            Some(entry) if Arc::ptr_eq(&entry.connection, connection) => {
                entry.tools = discovered.clone();
            }
            _ => {
                tracing::debug!(provider = %name, "Provider replaced or closed during discovery");
                return;
            }
        }

        state.tools.retain(|_, t| t.provider != name);
        for descriptor in discovered {
            let key = format!("{}.{}", name, descriptor.name);
            tracing::debug!(tool = %key, "Registered remote tool");
            state.tools.insert(
                key,
                RemoteTool {
                    provider: name.to_string(),
                    descriptor,
                },
            );
        }
    }

    /// One health tick: connect absent providers, recreate tool-less ones
    pub async fn reconnect_all(&self) {
        if !self.config.enabled {
            return;
        }

        for (rank, provider) in self.config.clients.iter().enumerate() {
            if !provider.enabled {
                continue;
            }

            let existing = {
                let state = self.state.read().await;
                state
                    .providers
                    .get(&provider.name)
                    .map(|e| (Arc::clone(&e.connection), e.tools.len()))
            };

            match existing {
                Some((_, tools)) if tools > 0 => continue,
                Some((stale, _)) => {
                    tracing::info!(provider = %provider.name, "Reconnecting provider");
                    stale.close().await;
                }
                None => {}
            }

            match self.connect_provider(rank, provider).await {
                Ok(connection) => self.register_tools(&provider.name, &connection).await,
                Err(e) => {
                    tracing::warn!(provider = %provider.name, error = %e, "Failed to reconnect provider");
                }
            }
        }
    }

    /// Run [`reconnect_all`](Self::reconnect_all) on every health interval until cancelled
    pub fn spawn_health_checker(self: &Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        let pool = Arc::clone(self);
        let period = self.config.health_interval();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        log::debug!("Provider health checker stopping");
                        break;
                    }
                    _ = ticker.tick() => pool.reconnect_all().await,
                }
            }
        })
    }

    /// Providers to try for `name`, in precedence order, with the tool name to send
    async fn candidates(&self, name: &str) -> Vec<(String, Arc<dyn ProviderConnection>, String)> {
        let state = self.state.read().await;
        let mut candidates = Vec::new();

        let namespaced = state
            .tools
            .get(name)
            .and_then(|remote| state.providers.get(&remote.provider).map(|entry| (entry, remote)));
        if let Some((entry, remote)) = namespaced {
            candidates.push((
                entry.name.clone(),
                Arc::clone(&entry.connection),
                remote.descriptor.name.clone(),
            ));
        }

        for entry in state.ranked() {
            if candidates.iter().any(|(p, _, _)| p == &entry.name) {
                continue;
            }
            if entry.tools.iter().any(|t| t.name == name) {
                candidates.push((entry.name.clone(), Arc::clone(&entry.connection), name.to_string()));
            }
        }
        candidates
    }

    /// Run a tool on the first provider that exposes it and succeeds
    pub async fn execute_tool(&self, name: &str, arguments: &str, cancel: &CancellationToken) -> Result<String> {
        let args = match parse_arguments(arguments) {
            Ok(args) => args,
            Err(e) => {
                tracing::warn!(tool = %name, error = %e, "Failed to parse tool arguments, using empty object");
                Map::new()
            }
        };

        for (provider, connection, tool) in self.candidates(name).await {
            tracing::debug!(provider = %provider, tool = %tool, "Invoking remote tool");
            let outcome = tokio::select! {
                _ = cancel.cancelled() => {
                    return Err(RelayError::Invocation(format!("call to '{}' cancelled", name)));
                }
                outcome = connection.call_tool(&tool, args.clone()) => outcome,
            };

            match outcome {
                Ok(raw) => return Ok(raw),
                Err(e) => {
                    tracing::warn!(provider = %provider, tool = %tool, error = %e, "Remote tool failed");
                }
            }
        }

        Err(RelayError::LookupFailure(format!(
            "tool '{}' not found or execution failed on all providers",
            name
        )))
    }

    /// Close every connection and forget all providers and tools
    pub async fn close(&self) {
        let connections: Vec<(String, Arc<dyn ProviderConnection>)> = {
            let mut state = self.state.write().await;
            state.tools.clear();
            state.providers.drain().map(|(name, e)| (name, e.connection)).collect()
        };

        for (name, connection) in connections {
            connection.close().await;
            log::debug!("Closed provider '{}'", name);
        }
    }

    /// Provider name to "exposes at least one tool"
    pub async fn health_check(&self) -> BTreeMap<String, bool> {
        let state = self.state.read().await;
        state
            .providers
            .values()
            .map(|e| (e.name.clone(), !e.tools.is_empty()))
            .collect()
    }

    /// Every remote descriptor under its own name, in precedence order
    pub async fn descriptors(&self) -> Vec<ToolDescriptor> {
        let state = self.state.read().await;
        state.ranked().into_iter().flat_map(|e| e.tools.iter().cloned()).collect()
    }

    /// Namespaced keys of every registered tool, sorted
    pub async fn namespaced_tool_names(&self) -> Vec<String> {
        let state = self.state.read().await;
        let mut names: Vec<_> = state.tools.keys().cloned().collect();
        names.sort();
        names
    }

    /// Connected providers in precedence order
    pub async fn provider_names(&self) -> Vec<String> {
        let state = self.state.read().await;
        state.ranked().into_iter().map(|e| e.name.clone()).collect()
    }

    pub async fn provider_tool_count(&self, name: &str) -> Option<usize> {
        let state = self.state.read().await;
        state.providers.get(name).map(|e| e.tools.len())
    }

    /// Status of every connected provider in precedence order
    pub async fn providers(&self) -> Vec<ProviderStatus> {
        let state = self.state.read().await;
        state
            .ranked()
            .into_iter()
            .map(|e| ProviderStatus {
                name: e.name.clone(),
                endpoint: e.endpoint.clone(),
                description: e.description.clone(),
                tools: e.tools.len(),
            })
            .collect()
    }
}

impl std::fmt::Debug for ProviderPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderPool")
            .field("enabled", &self.config.enabled)
            .field("configured", &self.config.clients.len())
            .finish()
    }
}
