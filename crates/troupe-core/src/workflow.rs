// Troupe Core - Workflow and collaboration types
//
// A WorkflowDefinition is the static DAG of agent function calls; a
// WorkflowExecution is one run of it. CollaborationGroup describes the
// higher-level composition patterns executed by the collaboration engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::data::AgentData;
use crate::function::FunctionResult;

/// Composition shape of a workflow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowType {
    Sequential,
    Parallel,
    Pipeline,
    Consensus,
    Hierarchy,
    Negotiation,
}

impl Default for WorkflowType {
    fn default() -> Self {
        Self::Sequential
    }
}

/// One node of the workflow DAG
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowStep {
    /// Unique within the workflow
    pub step_id: String,

    /// Target agent id, or a name resolved through the manager
    pub agent_id: String,

    pub function_name: String,

    #[serde(default)]
    pub parameters: AgentData,

    /// Step ids that must have completed first
    #[serde(default)]
    pub dependencies: Vec<String>,

    /// May run concurrently with other ready steps
    #[serde(default)]
    pub parallel_allowed: bool,

    /// Linear re-invocations after a failure
    #[serde(default)]
    pub retry_count: u32,

    /// Wall-clock budget in milliseconds (0 = unbounded)
    #[serde(default)]
    pub timeout_ms: u64,

    /// A failed optional step (or dependency) downgrades to a warning
    #[serde(default)]
    pub optional: bool,
}

impl WorkflowStep {
    pub fn new(
        step_id: impl Into<String>,
        agent_id: impl Into<String>,
        function_name: impl Into<String>,
    ) -> Self {
        Self {
            step_id: step_id.into(),
            agent_id: agent_id.into(),
            function_name: function_name.into(),
            parameters: AgentData::new(),
            dependencies: Vec::new(),
            parallel_allowed: false,
            retry_count: 0,
            timeout_ms: 0,
            optional: false,
        }
    }

    pub fn with_parameters(mut self, parameters: AgentData) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn depends_on(mut self, step_id: impl Into<String>) -> Self {
        self.dependencies.push(step_id.into());
        self
    }

    pub fn parallel(mut self) -> Self {
        self.parallel_allowed = true;
        self
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn retries(mut self, count: u32) -> Self {
        self.retry_count = count;
        self
    }

    pub fn timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }
}

/// The static workflow graph
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    pub id: String,
    pub name: String,

    #[serde(rename = "type", default)]
    pub workflow_type: WorkflowType,

    #[serde(default)]
    pub steps: Vec<WorkflowStep>,

    /// Context merged under every step's input (input context wins)
    #[serde(default)]
    pub global_context: AgentData,
}

impl WorkflowDefinition {
    pub fn new(id: impl Into<String>, name: impl Into<String>, workflow_type: WorkflowType) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            workflow_type,
            steps: Vec::new(),
            global_context: AgentData::new(),
        }
    }

    pub fn step(mut self, step: WorkflowStep) -> Self {
        self.steps.push(step);
        self
    }

    pub fn with_global_context(mut self, context: AgentData) -> Self {
        self.global_context = context;
        self
    }

    /// Definition-level sanity check: unique step ids, known dependency ids
    pub fn validate(&self) -> Result<(), String> {
        let mut seen = std::collections::BTreeSet::new();
        for step in &self.steps {
            if !seen.insert(step.step_id.as_str()) {
                return Err(format!("duplicate step id '{}'", step.step_id));
            }
        }
        for step in &self.steps {
            for dep in &step.dependencies {
                if !seen.contains(dep.as_str()) {
                    return Err(format!(
                        "step '{}' depends on unknown step '{}'",
                        step.step_id, dep
                    ));
                }
            }
        }
        Ok(())
    }
}

/// State machine of a workflow execution.
///
/// PENDING → RUNNING → {COMPLETED | FAILED | CANCELLED | TIMEOUT};
/// RUNNING ↔ PAUSED. Terminal states are absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionState {
    Pending,
    Running,
    Paused,
    Completed,
    Failed,
    Cancelled,
    Timeout,
}

impl ExecutionState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExecutionState::Completed
                | ExecutionState::Failed
                | ExecutionState::Cancelled
                | ExecutionState::Timeout
        )
    }
}

impl fmt::Display for ExecutionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExecutionState::Pending => "pending",
            ExecutionState::Running => "running",
            ExecutionState::Paused => "paused",
            ExecutionState::Completed => "completed",
            ExecutionState::Failed => "failed",
            ExecutionState::Cancelled => "cancelled",
            ExecutionState::Timeout => "timeout",
        };
        write!(f, "{}", s)
    }
}

/// Outcome of one executed step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRecord {
    pub step_id: String,
    pub function_name: String,
    pub result: FunctionResult,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub attempts: u32,
}

/// One run of a workflow
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowExecution {
    pub execution_id: String,
    pub workflow_id: String,
    pub state: ExecutionState,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,

    /// step_id → outcome
    #[serde(default)]
    pub step_results: BTreeMap<String, StepRecord>,

    #[serde(default)]
    pub success: bool,

    #[serde(default)]
    pub error: String,
}

impl WorkflowExecution {
    pub fn new(execution_id: impl Into<String>, workflow_id: impl Into<String>) -> Self {
        Self {
            execution_id: execution_id.into(),
            workflow_id: workflow_id.into(),
            state: ExecutionState::Pending,
            started_at: None,
            ended_at: None,
            step_results: BTreeMap::new(),
            success: false,
            error: String::new(),
        }
    }

    /// Total wall-clock duration once both instants are recorded
    pub fn duration_ms(&self) -> Option<i64> {
        match (self.started_at, self.ended_at) {
            (Some(start), Some(end)) => Some((end - start).num_milliseconds()),
            _ => None,
        }
    }
}

/// Aggregates parallel collaboration results into one value
pub type ResultAggregator = Arc<dyn Fn(&[FunctionResult]) -> AgentData + Send + Sync>;

/// Composition pattern of a collaboration group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollaborationPattern {
    Sequential,
    Parallel,
    Pipeline,
    Consensus,
    Hierarchy,
    Negotiation,
}

/// A named set of agents composed under one pattern
#[derive(Clone)]
pub struct CollaborationGroup {
    pub group_id: String,
    pub name: String,
    pub pattern: CollaborationPattern,
    pub agent_ids: Vec<String>,
    pub shared_context: AgentData,

    /// Minimum identical votes for consensus
    pub consensus_threshold: usize,

    pub max_negotiation_rounds: usize,

    pub result_aggregator: Option<ResultAggregator>,
}

impl CollaborationGroup {
    pub fn new(
        group_id: impl Into<String>,
        name: impl Into<String>,
        pattern: CollaborationPattern,
        agent_ids: Vec<String>,
    ) -> Self {
        Self {
            group_id: group_id.into(),
            name: name.into(),
            pattern,
            agent_ids,
            shared_context: AgentData::new(),
            consensus_threshold: 1,
            max_negotiation_rounds: 3,
            result_aggregator: None,
        }
    }

    pub fn with_threshold(mut self, threshold: usize) -> Self {
        self.consensus_threshold = threshold;
        self
    }

    pub fn with_negotiation_rounds(mut self, rounds: usize) -> Self {
        self.max_negotiation_rounds = rounds;
        self
    }

    pub fn with_aggregator(mut self, aggregator: ResultAggregator) -> Self {
        self.result_aggregator = Some(aggregator);
        self
    }
}

impl fmt::Debug for CollaborationGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollaborationGroup")
            .field("group_id", &self.group_id)
            .field("name", &self.name)
            .field("pattern", &self.pattern)
            .field("agent_ids", &self.agent_ids)
            .field("consensus_threshold", &self.consensus_threshold)
            .field("max_negotiation_rounds", &self.max_negotiation_rounds)
            .field("has_aggregator", &self.result_aggregator.is_some())
            .finish()
    }
}
