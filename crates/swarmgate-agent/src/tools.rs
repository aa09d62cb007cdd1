use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use swarmgate_core::SwarmgateResult;

/// Reserved tool name the model calls to transfer conversation control.
/// Arguments: `{"agent": "<name>", "context": {...}}`.
pub const HANDOFF_TOOL: &str = "handoff";

/// The effect of executing a tool: either textual output appended to the
/// conversation, or a transfer of control to another agent.
#[derive(Debug, Clone)]
pub enum ToolEffect {
    Output(String),
    Handoff {
        agent: String,
        context: HashMap<String, serde_json::Value>,
    },
}

/// Handler invoked when the model requests a tool by name.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn invoke(&self, arguments: serde_json::Value) -> SwarmgateResult<ToolEffect>;
}

/// A tool registered on a worker agent: name, description, parameter
/// schema, and handler.
#[derive(Clone)]
pub struct AgentTool {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
    pub handler: Arc<dyn ToolHandler>,
}

impl AgentTool {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: serde_json::Value,
        handler: Arc<dyn ToolHandler>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
            handler,
        }
    }
}

impl std::fmt::Debug for AgentTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentTool")
            .field("name", &self.name)
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}
