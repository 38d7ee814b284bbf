// Troupe Runtime - Execution substrate
//
// Hosts the agent actors, the async service layer (worker pool, priority
// queue, operation registry, event bus), the workflow orchestrator with
// its collaboration patterns, and the planning/reasoning layer.

pub mod agent;
pub mod functions;
pub mod manager;
pub mod orchestrator;
pub mod planning;
pub mod reasoning;
pub mod service;

pub use agent::{Agent, AgentFunction, AgentStatistics};
pub use functions::{closure_function, default_function_set, function_set_by_names};
pub use manager::AgentManager;
pub use orchestrator::{CollaborationEngine, WorkflowOrchestrator};
pub use planning::{PlanningCoordinator, PlanningStatistics, PlanningSystem};
pub use reasoning::ReasoningSystem;
pub use service::{
    AsyncServiceLayer, EventBus, OperationRecord, OperationStatus, QueueStatistics, Submission,
    WorkerStatistics,
};
