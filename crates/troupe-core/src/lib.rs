// Troupe Core - Foundation types for the Troupe multi-agent runtime
//
// This crate provides the shared data model: the AgentData value type,
// function schemas and results, workflow and collaboration definitions,
// planning types, operation events, and the runtime configuration.

pub mod config;
pub mod data;
pub mod error;
pub mod event;
pub mod function;
pub mod plan;
pub mod workflow;

pub use config::{
    AgentSettings, InferenceSettings, LoggingSettings, ModelParameters, RuntimeConfig,
    ServiceSettings,
};
pub use data::{AgentData, Value};
pub use error::{TroupeError, TroupeResult};
pub use event::{Event, EventKind};
pub use function::{FunctionResult, FunctionSpec, ParameterSpec, ValueKind};
pub use plan::{ExecutionPlan, PlanTask, PlanningStrategy, TaskPriority, TaskStatus};
pub use workflow::{
    CollaborationGroup, CollaborationPattern, ExecutionState, ResultAggregator, StepRecord,
    WorkflowDefinition, WorkflowExecution, WorkflowStep, WorkflowType,
};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default bound on the async task queue
pub const DEFAULT_MAX_QUEUE_SIZE: usize = 1000;

/// Default per-agent concurrency cap
pub const DEFAULT_MAX_CONCURRENT_JOBS: usize = 5;

/// How many operation events the late-joiner ring buffer retains
pub const EVENT_RING_CAPACITY: usize = 100;
