//! Tool abstraction and a name-indexed registry.
//!
//! [`ToolRegistry`] is the stock [`ToolExecutor`]: it advertises every
//! registered tool and reports unknown names and tool errors as failed
//! outcomes instead of errors.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::backend::{ToolDeclaration, ToolExecutor, ToolOutcome};
use crate::error::{EngineResult, ReasoningError};

/// A capability the iterative engine can invoke.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique name (e.g. "read_file").
    fn name(&self) -> &str;

    /// What the tool does, sent to the backend.
    fn description(&self) -> &str;

    /// JSON Schema describing the arguments.
    fn parameters_schema(&self) -> serde_json::Value;

    /// Run the tool. Errors become failed outcomes.
    async fn execute(&self, arguments: &serde_json::Value) -> EngineResult<String>;

    /// Declaration advertised to the backend.
    fn to_declaration(&self) -> ToolDeclaration {
        ToolDeclaration {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

/// A registry of available tools.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. Replaces any existing tool with the same name.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    /// Builder-style [`register`](Self::register).
    pub fn with_tool(mut self, tool: Arc<dyn Tool>) -> Self {
        self.register(tool);
        self
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.get(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

#[async_trait]
impl ToolExecutor for ToolRegistry {
    fn declarations(&self) -> Vec<ToolDeclaration> {
        let mut declarations: Vec<ToolDeclaration> =
            self.tools.values().map(|t| t.to_declaration()).collect();
        declarations.sort_by(|a, b| a.name.cmp(&b.name));
        declarations
    }

    async fn execute(&self, name: &str, arguments: &serde_json::Value) -> ToolOutcome {
        let Some(tool) = self.tools.get(name) else {
            warn!(tool = %name, "Unknown tool requested");
            return ToolOutcome::failed(
                ReasoningError::Tool {
                    tool_name: name.to_string(),
                    message: "no such tool".to_string(),
                }
                .to_string(),
            );
        };

        debug!(tool = %name, "Executing tool");
        match tool.execute(arguments).await {
            Ok(output) => ToolOutcome::ok(output),
            Err(e) => {
                warn!(tool = %name, error = %e, "Tool execution failed");
                ToolOutcome::failed(e.to_string())
            }
        }
    }
}
