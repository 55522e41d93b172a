//! Tool registry - manages and dispatches tool calls
//!
//! Central hub for registering tools and routing tool calls to handlers.
//! Nothing leaves `execute` except a `ToolOutcome`: unknown names and tool
//! failures are both reported as error messages.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::core::{Config, Result, ToolDeclaration, ToolOutcome};
use crate::tools::calculator::CalculatorTool;
use crate::tools::car_search::CarSearchTool;

/// A function the model can call
#[async_trait]
pub trait Tool: Send + Sync {
    /// Declaration advertised to the model
    fn declaration(&self) -> ToolDeclaration;

    /// Validate the arguments and run the tool
    async fn execute(&self, arguments: &serde_json::Value) -> ToolOutcome;
}

/// Registry of available tools
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with the built-in tools
    pub fn with_builtin(config: &Config) -> Result<Self> {
        let mut registry = Self::new();
        registry.register(Arc::new(CalculatorTool::new()));
        registry.register(Arc::new(CarSearchTool::from_config(&config.car_search)?));
        Ok(registry)
    }

    /// Register a tool under its declared name, replacing any previous one
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.declaration().name;
        if self.tools.insert(name.clone(), tool).is_some() {
            tracing::warn!(tool = %name, "replaced an already registered tool");
        }
    }

    /// Look up a tool by name
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Whether a tool with this name exists
    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Declaration of a registered tool
    pub fn declaration(&self, name: &str) -> Option<ToolDeclaration> {
        self.tools.get(name).map(|tool| tool.declaration())
    }

    /// Names of all registered tools, sorted
    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(String::as_str).collect()
    }

    /// Execute a tool by name
    pub async fn execute(&self, name: &str, arguments: &serde_json::Value) -> ToolOutcome {
        match self.tools.get(name) {
            Some(tool) => tool.execute(arguments).await,
            None => Err(format!("Unknown tool: {}", name)),
        }
    }
}
