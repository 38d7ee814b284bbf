// Troupe Core - Planning-layer types
//
// An ExecutionPlan owns a set of tasks with declared dependencies. The
// planning system (troupe-runtime) builds these from goals and schedules
// them topologically.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::data::AgentData;

/// Scheduling weight of a planning task
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskPriority {
    Low,
    Normal,
    High,
    Critical,
}

impl Default for TaskPriority {
    fn default() -> Self {
        Self::Normal
    }
}

/// Lifecycle of a planning task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }
}

/// Strategy applied when a goal is decomposed into tasks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanningStrategy {
    /// Each task depends on the previous one
    Sequential,
    /// All tasks independent
    Parallel,
    /// Sorted descending by priority
    PriorityBased,
    /// Dependencies validated, then topologically sorted
    DependencyAware,
}

/// One work item in an execution plan
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanTask {
    pub id: String,
    pub name: String,

    /// Agent function that realizes this task
    pub function_name: String,

    #[serde(default)]
    pub priority: TaskPriority,

    pub status: TaskStatus,

    /// Ids of tasks that must complete first
    #[serde(default)]
    pub dependencies: BTreeSet<String>,

    #[serde(default)]
    pub estimated_duration_secs: f64,

    #[serde(default)]
    pub actual_duration_secs: f64,

    #[serde(default)]
    pub result: AgentData,

    #[serde(default)]
    pub error: String,

    pub created_at: DateTime<Utc>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl PlanTask {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        function_name: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            function_name: function_name.into(),
            priority: TaskPriority::Normal,
            status: TaskStatus::Pending,
            dependencies: BTreeSet::new(),
            estimated_duration_secs: 0.0,
            actual_duration_secs: 0.0,
            result: AgentData::new(),
            error: String::new(),
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    pub fn depends_on(mut self, task_id: impl Into<String>) -> Self {
        self.dependencies.insert(task_id.into());
        self
    }
}

/// A set of tasks realizing one goal
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionPlan {
    pub id: String,
    pub name: String,

    #[serde(default)]
    pub goal: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub tasks: Vec<PlanTask>,

    pub created_at: DateTime<Utc>,
}

impl ExecutionPlan {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            goal: String::new(),
            description: String::new(),
            tasks: Vec::new(),
            created_at: Utc::now(),
        }
    }

    pub fn add_task(&mut self, task: PlanTask) {
        self.tasks.push(task);
    }

    pub fn task(&self, task_id: &str) -> Option<&PlanTask> {
        self.tasks.iter().find(|t| t.id == task_id)
    }

    pub fn task_mut(&mut self, task_id: &str) -> Option<&mut PlanTask> {
        self.tasks.iter_mut().find(|t| t.id == task_id)
    }

    pub fn remove_task(&mut self, task_id: &str) -> bool {
        let before = self.tasks.len();
        self.tasks.retain(|t| t.id != task_id);
        self.tasks.len() != before
    }

    /// Pending tasks whose dependencies are all COMPLETED
    pub fn ready_tasks(&self) -> Vec<&PlanTask> {
        self.tasks
            .iter()
            .filter(|task| {
                task.status == TaskStatus::Pending
                    && task.dependencies.iter().all(|dep| {
                        self.task(dep)
                            .map(|d| d.status == TaskStatus::Completed)
                            .unwrap_or(false)
                    })
            })
            .collect()
    }

    pub fn tasks_by_status(&self, status: TaskStatus) -> Vec<&PlanTask> {
        self.tasks.iter().filter(|t| t.status == status).collect()
    }

    /// Complete when every task is COMPLETED or CANCELLED
    pub fn is_complete(&self) -> bool {
        self.tasks.iter().all(|t| {
            matches!(t.status, TaskStatus::Completed | TaskStatus::Cancelled)
        })
    }

    /// completed / total; an empty plan counts as done
    pub fn progress(&self) -> f64 {
        if self.tasks.is_empty() {
            return 1.0;
        }
        let completed = self
            .tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Completed)
            .count();
        completed as f64 / self.tasks.len() as f64
    }

    pub fn estimated_duration_secs(&self) -> f64 {
        self.tasks.iter().map(|t| t.estimated_duration_secs).sum()
    }
}
