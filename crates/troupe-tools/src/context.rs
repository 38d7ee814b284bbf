// Troupe Tools - Execution context handed to every tool

use troupe_core::AgentData;

/// Ambient information a tool receives at execution time
#[derive(Debug, Clone, Default)]
pub struct ToolContext {
    /// Id of the agent invoking the tool, when there is one
    pub agent_id: Option<String>,

    /// Workflow execution the call belongs to, when there is one
    pub execution_id: Option<String>,

    /// Free-form shared state
    pub shared: AgentData,
}

impl ToolContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_agent(agent_id: impl Into<String>) -> Self {
        Self {
            agent_id: Some(agent_id.into()),
            execution_id: None,
            shared: AgentData::new(),
        }
    }

    pub fn with_execution(mut self, execution_id: impl Into<String>) -> Self {
        self.execution_id = Some(execution_id.into());
        self
    }
}
