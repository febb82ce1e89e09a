//! Tool registry - name to local tool lookup

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use super::{ForgetContextTool, RecallContextTool, RememberContextTool, Tool};
use crate::error::{RelayError, Result};
use crate::llm::ToolDescriptor;

/// Local tools available to the dispatcher
///
/// Written at startup, read concurrently by every turn.
#[derive(Default)]
pub struct ToolRegistry {
    tools: RwLock<HashMap<String, Arc<dyn Tool>>>,
}

impl ToolRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry holding the built-in session tools
    pub fn with_builtin_tools() -> Result<Self> {
        let registry = Self::new();
        registry.register(Arc::new(RememberContextTool))?;
        registry.register(Arc::new(RecallContextTool))?;
        registry.register(Arc::new(ForgetContextTool))?;
        Ok(registry)
    }

    /// Register a tool; a taken name fails and keeps the first registration
    pub fn register(&self, tool: Arc<dyn Tool>) -> Result<()> {
        let name = tool.name().to_string();
        let mut tools = self.tools.write().unwrap_or_else(PoisonError::into_inner);
        if tools.contains_key(&name) {
            return Err(RelayError::RegistrationConflict(name));
        }
        log::debug!("Registered local tool '{}'", name);
        tools.insert(name, tool);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }

    /// Snapshot of every tool, sorted by name
    pub fn all(&self) -> Vec<Arc<dyn Tool>> {
        let mut tools: Vec<_> = self
            .tools
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        tools.sort_by(|a, b| a.name().cmp(b.name()));
        tools
    }

    /// Descriptors for model binding, sorted by name
    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        self.all().iter().map(|t| t.descriptor()).collect()
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<String> {
        self.all().iter().map(|t| t.name().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry").field("tools", &self.names()).finish()
    }
}
