// Troupe Runtime - Workflow orchestrator
//
// Two engines: the workflow engine executes a WorkflowDefinition as a DAG
// of agent function calls; the collaboration engine composes agents under
// the six collaboration patterns.

mod collaboration;
mod engine;

pub use collaboration::CollaborationEngine;
pub use engine::WorkflowOrchestrator;

use troupe_core::{AgentData, FunctionResult};

/// Flatten a FunctionResult into the AgentData payload carried by async
/// operations and HTTP responses.
pub(crate) fn result_to_data(result: &FunctionResult) -> AgentData {
    AgentData::new()
        .with("success", result.success)
        .with("data", result.data.clone())
        .with("error", result.error.clone())
}

/// Inverse of [`result_to_data`]
pub(crate) fn data_to_result(data: &AgentData) -> FunctionResult {
    FunctionResult {
        success: data.get_bool_or("success", false),
        data: data.get_map("data").cloned().unwrap_or_default(),
        error: data.get_string_or("error", ""),
    }
}
