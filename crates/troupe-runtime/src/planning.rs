// Troupe Runtime - Planning system
//
// Decomposes goals into task graphs, applies a scheduling strategy, and
// answers readiness/cycle queries over the active plans. The template
// decomposition stands in for an LLM-backed planner.

use parking_lot::Mutex;
use rand::Rng;
use serde::Serialize;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

use troupe_core::{
    AgentData, ExecutionPlan, PlanTask, PlanningStrategy, TaskPriority, TaskStatus, TroupeError,
    TroupeResult,
};

use crate::reasoning::ReasoningSystem;

/// Aggregate counters over active and completed plans
#[derive(Debug, Clone, Default, Serialize)]
pub struct PlanningStatistics {
    pub active_plans: usize,
    pub completed_plans: usize,
    pub total_tasks: usize,
    pub completed_tasks: usize,
    pub average_task_duration_secs: f64,
    pub success_rate: f64,
}

#[derive(Default)]
struct PlanningInner {
    active: HashMap<String, ExecutionPlan>,
    completed: HashMap<String, ExecutionPlan>,
}

/// Goal decomposition and plan tracking
pub struct PlanningSystem {
    inner: Mutex<PlanningInner>,
    task_counter: AtomicU64,
    plan_counter: AtomicU64,
}

impl Default for PlanningSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl PlanningSystem {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(PlanningInner::default()),
            task_counter: AtomicU64::new(0),
            plan_counter: AtomicU64::new(0),
        }
    }

    /// Decompose a goal into a plan under the given strategy
    pub fn decompose_goal(
        &self,
        goal: &str,
        _context: &str,
        strategy: PlanningStrategy,
    ) -> ExecutionPlan {
        let plan_id = self.next_plan_id();
        let mut plan = ExecutionPlan::new(plan_id, format!("Plan for: {}", goal));
        plan.goal = goal.to_string();
        plan.description = "Auto-generated plan for goal decomposition".to_string();

        let mut tasks = self.decompose_complex_goal(goal);

        match strategy {
            PlanningStrategy::Sequential => {
                for i in 1..tasks.len() {
                    let prev = tasks[i - 1].id.clone();
                    tasks[i].dependencies.insert(prev);
                }
            }
            PlanningStrategy::Parallel => {
                for task in &mut tasks {
                    task.dependencies.clear();
                }
            }
            PlanningStrategy::PriorityBased => {
                tasks.sort_by(|a, b| b.priority.cmp(&a.priority));
            }
            PlanningStrategy::DependencyAware => {
                if validate_dependencies(&tasks) {
                    sort_topologically(&mut tasks);
                } else {
                    warn!(goal = %goal, "invalid dependencies in decomposed plan");
                }
            }
        }

        for task in tasks {
            plan.add_task(task);
        }

        info!(plan = %plan.id, tasks = plan.tasks.len(), "created plan");
        plan
    }

    pub fn add_plan(&self, plan: ExecutionPlan) -> TroupeResult<()> {
        let mut inner = self.inner.lock();
        if inner.active.contains_key(&plan.id) {
            return Err(TroupeError::conflict(format!(
                "plan '{}' already exists",
                plan.id
            )));
        }
        inner.active.insert(plan.id.clone(), plan);
        Ok(())
    }

    /// Remove a plan; complete plans move to the completed archive
    pub fn remove_plan(&self, plan_id: &str) -> bool {
        let mut inner = self.inner.lock();
        let Some(plan) = inner.active.remove(plan_id) else {
            return false;
        };
        if plan.is_complete() {
            inner.completed.insert(plan_id.to_string(), plan);
        }
        true
    }

    pub fn get_plan(&self, plan_id: &str) -> Option<ExecutionPlan> {
        self.inner.lock().active.get(plan_id).cloned()
    }

    pub fn active_plan_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.inner.lock().active.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn add_task_to_plan(&self, plan_id: &str, task: PlanTask) -> bool {
        let mut inner = self.inner.lock();
        match inner.active.get_mut(plan_id) {
            Some(plan) => {
                plan.add_task(task);
                true
            }
            None => false,
        }
    }

    /// Tasks whose dependencies are all COMPLETED
    pub fn get_ready_tasks(&self, plan_id: &str) -> Vec<PlanTask> {
        self.inner
            .lock()
            .active
            .get(plan_id)
            .map(|plan| plan.ready_tasks().into_iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn can_execute_task(&self, plan_id: &str, task_id: &str) -> bool {
        self.get_ready_tasks(plan_id)
            .iter()
            .any(|task| task.id == task_id)
    }

    /// Update a task's status, stamping start/completion instants and the
    /// actual duration
    pub fn update_task_status(
        &self,
        plan_id: &str,
        task_id: &str,
        status: TaskStatus,
        error: Option<&str>,
    ) -> bool {
        let mut inner = self.inner.lock();
        let Some(task) = inner
            .active
            .get_mut(plan_id)
            .and_then(|plan| plan.task_mut(task_id))
        else {
            return false;
        };

        task.status = status;
        if let Some(error) = error {
            task.error = error.to_string();
        }

        let now = chrono::Utc::now();
        match status {
            TaskStatus::InProgress => task.started_at = Some(now),
            TaskStatus::Completed | TaskStatus::Failed => {
                task.completed_at = Some(now);
                if let Some(started) = task.started_at {
                    task.actual_duration_secs =
                        (now - started).num_milliseconds() as f64 / 1000.0;
                }
            }
            _ => {}
        }
        true
    }

    pub fn set_task_result(&self, plan_id: &str, task_id: &str, result: AgentData) -> bool {
        let mut inner = self.inner.lock();
        match inner
            .active
            .get_mut(plan_id)
            .and_then(|plan| plan.task_mut(task_id))
        {
            Some(task) => {
                task.result = result;
                true
            }
            None => false,
        }
    }

    /// DFS with visit/recursion-stack coloring; returns the tasks on the
    /// first cycle found (empty when acyclic)
    pub fn detect_circular_dependencies(&self, plan_id: &str) -> Vec<String> {
        let inner = self.inner.lock();
        let Some(plan) = inner.active.get(plan_id) else {
            return Vec::new();
        };

        let deps: HashMap<&str, Vec<&str>> = plan
            .tasks
            .iter()
            .map(|task| {
                (
                    task.id.as_str(),
                    task.dependencies.iter().map(|d| d.as_str()).collect(),
                )
            })
            .collect();

        let mut visited: HashSet<&str> = HashSet::new();
        let mut stack: HashSet<&str> = HashSet::new();
        let mut cycle: Vec<String> = Vec::new();

        fn visit<'a>(
            node: &'a str,
            deps: &HashMap<&'a str, Vec<&'a str>>,
            visited: &mut HashSet<&'a str>,
            stack: &mut HashSet<&'a str>,
            cycle: &mut Vec<String>,
        ) -> bool {
            if stack.contains(node) {
                cycle.push(node.to_string());
                return true;
            }
            if visited.contains(node) {
                return false;
            }
            visited.insert(node);
            stack.insert(node);

            if let Some(children) = deps.get(node) {
                for child in children {
                    if visit(child, deps, visited, stack, cycle) {
                        if !cycle.contains(&node.to_string()) {
                            cycle.push(node.to_string());
                        }
                        return true;
                    }
                }
            }

            stack.remove(node);
            false
        }

        for task in &plan.tasks {
            if !visited.contains(task.id.as_str())
                && visit(task.id.as_str(), &deps, &mut visited, &mut stack, &mut cycle)
            {
                break;
            }
        }

        cycle
    }

    pub fn estimate_plan_duration_secs(&self, plan_id: &str) -> f64 {
        self.inner
            .lock()
            .active
            .get(plan_id)
            .map(|plan| plan.estimated_duration_secs())
            .unwrap_or(0.0)
    }

    pub fn summary(&self, plan_id: &str) -> String {
        let inner = self.inner.lock();
        let Some(plan) = inner.active.get(plan_id) else {
            return "Plan not found".to_string();
        };

        let by_status = |status| plan.tasks_by_status(status).len();
        format!(
            "Plan: {}\nGoal: {}\nTasks: {}\nProgress: {:.0}%\nPending: {}\nIn Progress: {}\nCompleted: {}\nFailed: {}\n",
            plan.name,
            plan.goal,
            plan.tasks.len(),
            plan.progress() * 100.0,
            by_status(TaskStatus::Pending),
            by_status(TaskStatus::InProgress),
            by_status(TaskStatus::Completed),
            by_status(TaskStatus::Failed),
        )
    }

    pub fn statistics(&self) -> PlanningStatistics {
        let inner = self.inner.lock();
        let mut stats = PlanningStatistics {
            active_plans: inner.active.len(),
            completed_plans: inner.completed.len(),
            ..Default::default()
        };

        let mut duration_total = 0.0;
        let mut duration_count = 0usize;
        for plan in inner.active.values().chain(inner.completed.values()) {
            stats.total_tasks += plan.tasks.len();
            for task in &plan.tasks {
                if task.status == TaskStatus::Completed {
                    stats.completed_tasks += 1;
                    if task.actual_duration_secs > 0.0 {
                        duration_total += task.actual_duration_secs;
                        duration_count += 1;
                    }
                }
            }
        }

        if duration_count > 0 {
            stats.average_task_duration_secs = duration_total / duration_count as f64;
        }
        if stats.total_tasks > 0 {
            stats.success_rate = stats.completed_tasks as f64 / stats.total_tasks as f64;
        }
        stats
    }

    /// Keyword-template decomposition; linear chains per template
    fn decompose_complex_goal(&self, goal: &str) -> Vec<PlanTask> {
        let goal_lower = goal.to_lowercase();
        let mut tasks: Vec<PlanTask>;

        if goal_lower.contains("research") {
            tasks = vec![
                self.task("Gather initial information", "web_search"),
                self.task("Analyze sources", "text_analysis"),
                self.task("Compile findings", "text_processing"),
            ];
            chain(&mut tasks, &[(1, 0), (2, 1)]);
        } else if goal_lower.contains("write") || goal_lower.contains("create") {
            tasks = vec![
                self.task("Plan content structure", "text_processing"),
                self.task("Research topic", "context_retrieval"),
                self.task("Write content", "text_processing"),
                self.task("Review and edit", "text_analysis"),
            ];
            chain(&mut tasks, &[(2, 0), (2, 1), (3, 2)]);
        } else if goal_lower.contains("analyze") {
            tasks = vec![
                self.task("Collect data", "data_analysis"),
                self.task("Process data", "data_transform"),
                self.task("Generate insights", "data_analysis"),
            ];
            chain(&mut tasks, &[(1, 0), (2, 1)]);
        } else {
            tasks = vec![
                self.task("Initial task", "echo"),
                self.task("Process task", "text_processing"),
                self.task("Final task", "echo"),
            ];
            chain(&mut tasks, &[(1, 0), (2, 1)]);
        }

        let mut rng = rand::thread_rng();
        for task in &mut tasks {
            task.estimated_duration_secs = 5.0 + rng.gen_range(0.0..10.0);
            task.priority = TaskPriority::Normal;
        }
        tasks
    }

    fn task(&self, name: &str, function: &str) -> PlanTask {
        PlanTask::new(self.next_task_id(), name, function)
    }

    fn next_task_id(&self) -> String {
        format!("task_{}", self.task_counter.fetch_add(1, Ordering::SeqCst) + 1)
    }

    fn next_plan_id(&self) -> String {
        format!("plan_{}", self.plan_counter.fetch_add(1, Ordering::SeqCst) + 1)
    }
}

/// Wire dependency edges (dependent_index, dependency_index)
fn chain(tasks: &mut [PlanTask], edges: &[(usize, usize)]) {
    for (dependent, dependency) in edges {
        let dep_id = tasks[*dependency].id.clone();
        tasks[*dependent].dependencies.insert(dep_id);
    }
}

/// Every declared dependency must reference a task in the set
fn validate_dependencies(tasks: &[PlanTask]) -> bool {
    let ids: HashSet<&str> = tasks.iter().map(|t| t.id.as_str()).collect();
    tasks
        .iter()
        .all(|task| task.dependencies.iter().all(|dep| ids.contains(dep.as_str())))
}

/// Kahn's algorithm; tasks unreachable from the order (cycles) keep their
/// relative position at the end
fn sort_topologically(tasks: &mut Vec<PlanTask>) {
    let mut in_degree: HashMap<String, usize> = HashMap::new();
    let mut adjacency: HashMap<String, Vec<String>> = HashMap::new();

    for task in tasks.iter() {
        in_degree.entry(task.id.clone()).or_insert(0);
        for dep in &task.dependencies {
            adjacency
                .entry(dep.clone())
                .or_default()
                .push(task.id.clone());
            *in_degree.entry(task.id.clone()).or_insert(0) += 1;
        }
    }

    let mut queue: VecDeque<String> = in_degree
        .iter()
        .filter(|(_, degree)| **degree == 0)
        .map(|(id, _)| id.clone())
        .collect();
    let mut order: Vec<String> = Vec::new();

    while let Some(current) = queue.pop_front() {
        order.push(current.clone());
        if let Some(children) = adjacency.get(&current) {
            for child in children {
                if let Some(degree) = in_degree.get_mut(child) {
                    *degree -= 1;
                    if *degree == 0 {
                        queue.push_back(child.clone());
                    }
                }
            }
        }
    }

    let position: HashMap<&str, usize> = order
        .iter()
        .enumerate()
        .map(|(i, id)| (id.as_str(), i))
        .collect();
    tasks.sort_by_key(|task| position.get(task.id.as_str()).copied().unwrap_or(usize::MAX));
    debug!(ordered = order.len(), total = tasks.len(), "topological sort applied");
}

/// Combines planning and reasoning, as the original coordinator did
pub struct PlanningCoordinator {
    planning: Arc<PlanningSystem>,
    reasoning: Arc<ReasoningSystem>,
}

impl PlanningCoordinator {
    pub fn new(planning: Arc<PlanningSystem>, reasoning: Arc<ReasoningSystem>) -> Self {
        Self {
            planning,
            reasoning,
        }
    }

    /// Analyze the goal, then build and register a dependency-aware plan
    pub fn create_intelligent_plan(
        &self,
        goal: &str,
        context: &str,
        available_functions: &[String],
    ) -> TroupeResult<ExecutionPlan> {
        let analysis = self
            .reasoning
            .reason_about(&format!("How to achieve: {}", goal), context);
        debug!(goal = %goal, "goal analysis: {}", analysis);

        if !self.reasoning.can_achieve_goal(goal, available_functions) {
            warn!(goal = %goal, "goal may not be achievable with available functions");
        }

        let plan = self
            .planning
            .decompose_goal(goal, context, PlanningStrategy::DependencyAware);
        self.planning.add_plan(plan.clone())?;
        Ok(plan)
    }

    /// Which ready task to run next, as advisory text
    pub fn recommend_next_action(&self, plan_id: &str, current_state: &str) -> String {
        let Some(plan) = self.planning.get_plan(plan_id) else {
            return "Plan not found".to_string();
        };

        let ready = self.planning.get_ready_tasks(plan_id);
        if ready.is_empty() {
            return if plan.is_complete() {
                "Plan is complete".to_string()
            } else {
                "No tasks are ready to execute. Check for failed dependencies.".to_string()
            };
        }

        let options: Vec<String> = ready
            .iter()
            .map(|task| format!("{} (ID: {})", task.name, task.id))
            .collect();
        let decision = self.reasoning.make_decision(
            current_state,
            &options,
            "task priority and dependencies",
        );
        format!("Recommended next action: {}", decision)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequential_strategy_chains_tasks() {
        let system = PlanningSystem::new();
        let plan = system.decompose_goal("research rust agents", "", PlanningStrategy::Sequential);
        assert_eq!(plan.tasks.len(), 3);
        assert!(plan.tasks[0].dependencies.is_empty());
        assert!(plan.tasks[1].dependencies.contains(&plan.tasks[0].id));
        assert!(plan.tasks[2].dependencies.contains(&plan.tasks[1].id));
    }

    #[test]
    fn test_parallel_strategy_clears_dependencies() {
        let system = PlanningSystem::new();
        let plan = system.decompose_goal("write a report", "", PlanningStrategy::Parallel);
        assert_eq!(plan.tasks.len(), 4);
        assert!(plan.tasks.iter().all(|t| t.dependencies.is_empty()));
    }

    #[test]
    fn test_templates_and_durations() {
        let system = PlanningSystem::new();
        let research = system.decompose_goal("research x", "", PlanningStrategy::Sequential);
        assert_eq!(research.tasks[0].function_name, "web_search");

        let analyze = system.decompose_goal("analyze data", "", PlanningStrategy::Sequential);
        assert_eq!(analyze.tasks.len(), 3);

        let generic = system.decompose_goal("do a thing", "", PlanningStrategy::Sequential);
        assert_eq!(generic.tasks[0].function_name, "echo");

        for task in &generic.tasks {
            assert!(task.estimated_duration_secs >= 5.0);
            assert!(task.estimated_duration_secs <= 15.0);
            assert_eq!(task.priority, TaskPriority::Normal);
        }
    }

    #[test]
    fn test_ready_tasks_and_status_updates() {
        let system = PlanningSystem::new();
        let plan = system.decompose_goal("research x", "", PlanningStrategy::Sequential);
        let plan_id = plan.id.clone();
        let first = plan.tasks[0].id.clone();
        let second = plan.tasks[1].id.clone();
        system.add_plan(plan).unwrap();

        let ready = system.get_ready_tasks(&plan_id);
        assert_eq!(ready.len(), 1);
        assert_eq!(ready[0].id, first);
        assert!(system.can_execute_task(&plan_id, &first));
        assert!(!system.can_execute_task(&plan_id, &second));

        assert!(system.update_task_status(&plan_id, &first, TaskStatus::InProgress, None));
        assert!(system.update_task_status(&plan_id, &first, TaskStatus::Completed, None));
        assert!(system.set_task_result(
            &plan_id,
            &first,
            AgentData::new().with("found", true)
        ));

        let ready = system.get_ready_tasks(&plan_id);
        assert_eq!(ready.len(), 1);
        assert_eq!(ready[0].id, second);
    }

    #[test]
    fn test_cycle_detection() {
        let system = PlanningSystem::new();
        let mut plan = ExecutionPlan::new("cyclic", "cyclic");
        plan.add_task(PlanTask::new("a", "a", "echo").depends_on("b"));
        plan.add_task(PlanTask::new("b", "b", "echo").depends_on("a"));
        plan.add_task(PlanTask::new("c", "c", "echo"));
        system.add_plan(plan).unwrap();

        let cycle = system.detect_circular_dependencies("cyclic");
        assert!(cycle.contains(&"a".to_string()));
        assert!(cycle.contains(&"b".to_string()));
        assert!(!cycle.contains(&"c".to_string()));
    }

    #[test]
    fn test_no_cycle_in_chain() {
        let system = PlanningSystem::new();
        let plan = system.decompose_goal("research x", "", PlanningStrategy::Sequential);
        let plan_id = plan.id.clone();
        system.add_plan(plan).unwrap();
        assert!(system.detect_circular_dependencies(&plan_id).is_empty());
    }

    #[test]
    fn test_topological_sort_orders_dependencies_first() {
        let mut tasks = vec![
            PlanTask::new("late", "late", "echo").depends_on("early"),
            PlanTask::new("early", "early", "echo"),
        ];
        sort_topologically(&mut tasks);
        assert_eq!(tasks[0].id, "early");
        assert_eq!(tasks[1].id, "late");
    }

    #[test]
    fn test_summary_and_statistics() {
        let system = PlanningSystem::new();
        let plan = system.decompose_goal("research x", "", PlanningStrategy::Sequential);
        let plan_id = plan.id.clone();
        let first = plan.tasks[0].id.clone();
        system.add_plan(plan).unwrap();
        system.update_task_status(&plan_id, &first, TaskStatus::InProgress, None);
        system.update_task_status(&plan_id, &first, TaskStatus::Completed, None);

        let summary = system.summary(&plan_id);
        assert!(summary.contains("Completed: 1"));
        assert!(summary.contains("Pending: 2"));

        let stats = system.statistics();
        assert_eq!(stats.active_plans, 1);
        assert_eq!(stats.total_tasks, 3);
        assert_eq!(stats.completed_tasks, 1);

        assert_eq!(system.summary("missing"), "Plan not found");
    }

    #[test]
    fn test_coordinator_recommends_ready_task() {
        let planning = Arc::new(PlanningSystem::new());
        let reasoning = Arc::new(ReasoningSystem::new());
        let coordinator = PlanningCoordinator::new(planning.clone(), reasoning);

        let plan = coordinator
            .create_intelligent_plan(
                "research rust",
                "",
                &["web_search".to_string(), "text_analysis".to_string()],
            )
            .unwrap();

        let advice = coordinator.recommend_next_action(&plan.id, "starting out");
        assert!(advice.contains("Recommended next action"));

        assert_eq!(
            coordinator.recommend_next_action("missing", ""),
            "Plan not found"
        );
    }
}
