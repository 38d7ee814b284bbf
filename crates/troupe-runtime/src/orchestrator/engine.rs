// Troupe Runtime - Workflow engine
//
// Ready-set execution over the step DAG: each outer iteration collects the
// steps whose dependencies are satisfied, runs the parallel-allowed ones
// through the async service layer and the rest inline, and folds the
// results back in. Step failures are captured, never raised; the workflow
// stalls only when no ready step remains.

use futures::FutureExt;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

use troupe_core::{
    AgentData, ExecutionState, FunctionResult, StepRecord, TroupeError, TroupeResult, Value,
    WorkflowDefinition, WorkflowExecution, WorkflowStep,
};

use crate::agent::Agent;
use crate::manager::AgentManager;
use crate::service::AsyncServiceLayer;

use super::{data_to_result, result_to_data};

/// How often a paused execution re-checks its state
const PAUSE_POLL: Duration = Duration::from_millis(50);

/// Owns workflow definitions and their executions
pub struct WorkflowOrchestrator {
    manager: Arc<AgentManager>,
    service: Arc<AsyncServiceLayer>,
    workflows: Mutex<HashMap<String, WorkflowDefinition>>,
    executions: dashmap::DashMap<String, Arc<Mutex<WorkflowExecution>>>,
}

impl WorkflowOrchestrator {
    pub fn new(manager: Arc<AgentManager>, service: Arc<AsyncServiceLayer>) -> Self {
        Self {
            manager,
            service,
            workflows: Mutex::new(HashMap::new()),
            executions: dashmap::DashMap::new(),
        }
    }

    /// Register a definition; duplicate ids conflict
    pub fn register_workflow(&self, workflow: WorkflowDefinition) -> TroupeResult<()> {
        workflow
            .validate()
            .map_err(TroupeError::validation)?;

        let mut workflows = self.workflows.lock();
        if workflows.contains_key(&workflow.id) {
            return Err(TroupeError::conflict(format!(
                "workflow '{}' already exists",
                workflow.id
            )));
        }
        info!(workflow = %workflow.id, "registered workflow");
        workflows.insert(workflow.id.clone(), workflow);
        Ok(())
    }

    pub fn remove_workflow(&self, workflow_id: &str) -> bool {
        self.workflows.lock().remove(workflow_id).is_some()
    }

    pub fn get_workflow(&self, workflow_id: &str) -> Option<WorkflowDefinition> {
        self.workflows.lock().get(workflow_id).cloned()
    }

    pub fn list_workflows(&self) -> Vec<WorkflowDefinition> {
        let mut workflows: Vec<WorkflowDefinition> =
            self.workflows.lock().values().cloned().collect();
        workflows.sort_by(|a, b| a.id.cmp(&b.id));
        workflows
    }

    pub fn get_execution(&self, execution_id: &str) -> Option<WorkflowExecution> {
        self.executions
            .get(execution_id)
            .map(|e| e.value().lock().clone())
    }

    pub fn list_executions(&self) -> Vec<WorkflowExecution> {
        let mut executions: Vec<WorkflowExecution> = self
            .executions
            .iter()
            .map(|e| e.value().lock().clone())
            .collect();
        executions.sort_by(|a, b| a.execution_id.cmp(&b.execution_id));
        executions
    }

    /// Start an execution in the background; returns its id immediately
    pub fn execute_workflow(
        self: &Arc<Self>,
        workflow_id: &str,
        input: AgentData,
    ) -> TroupeResult<String> {
        let workflow = self
            .get_workflow(workflow_id)
            .ok_or_else(|| TroupeError::not_found(format!("workflow '{}'", workflow_id)))?;

        let execution_id = format!("exec_{}", Uuid::new_v4().simple());
        let execution = Arc::new(Mutex::new(WorkflowExecution::new(
            execution_id.clone(),
            workflow_id,
        )));
        self.executions
            .insert(execution_id.clone(), execution.clone());

        let orchestrator = self.clone();
        tokio::spawn(async move {
            orchestrator.run_execution(workflow, execution, input).await;
        });

        Ok(execution_id)
    }

    /// Run an execution to completion and return its final state
    pub async fn execute_workflow_sync(
        self: &Arc<Self>,
        workflow_id: &str,
        input: AgentData,
    ) -> TroupeResult<WorkflowExecution> {
        let execution_id = self.execute_workflow(workflow_id, input)?;
        loop {
            if let Some(execution) = self.get_execution(&execution_id) {
                if execution.state.is_terminal() {
                    return Ok(execution);
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// Cooperative pause; running steps are not interrupted
    pub fn pause_execution(&self, execution_id: &str) -> bool {
        self.transition(execution_id, ExecutionState::Running, ExecutionState::Paused)
    }

    pub fn resume_execution(&self, execution_id: &str) -> bool {
        self.transition(execution_id, ExecutionState::Paused, ExecutionState::Running)
    }

    /// Flip a non-terminal execution to CANCELLED; the engine stops
    /// scheduling further batches
    pub fn cancel_execution(&self, execution_id: &str) -> bool {
        let Some(execution) = self.executions.get(execution_id) else {
            return false;
        };
        let mut execution = execution.value().lock();
        if execution.state.is_terminal() {
            return false;
        }
        execution.state = ExecutionState::Cancelled;
        execution.ended_at = Some(chrono::Utc::now());
        true
    }

    fn transition(&self, execution_id: &str, from: ExecutionState, to: ExecutionState) -> bool {
        let Some(execution) = self.executions.get(execution_id) else {
            return false;
        };
        let mut execution = execution.value().lock();
        if execution.state != from {
            return false;
        }
        execution.state = to;
        true
    }

    async fn run_execution(
        self: Arc<Self>,
        workflow: WorkflowDefinition,
        execution: Arc<Mutex<WorkflowExecution>>,
        input: AgentData,
    ) {
        {
            let mut execution = execution.lock();
            execution.state = ExecutionState::Running;
            execution.started_at = Some(chrono::Utc::now());
        }

        // input wins over the workflow's global context
        let merged_ctx = workflow.global_context.merged(&input);

        let mut completed: BTreeMap<String, StepRecord> = BTreeMap::new();
        let mut remaining: Vec<WorkflowStep> = workflow.steps.clone();
        let mut error = String::new();

        'outer: while !remaining.is_empty() {
            // Cooperative pause/cancel before scheduling the next batch
            loop {
                let state = execution.lock().state;
                match state {
                    ExecutionState::Paused => tokio::time::sleep(PAUSE_POLL).await,
                    ExecutionState::Cancelled => break 'outer,
                    _ => break,
                }
            }

            let (ready, blocked): (Vec<WorkflowStep>, Vec<WorkflowStep>) = remaining
                .into_iter()
                .partition(|step| dependencies_satisfied(step, &completed));
            remaining = blocked;

            if ready.is_empty() {
                let failed_dep = remaining.iter().find_map(|step| {
                    step.dependencies.iter().find_map(|dep| {
                        completed
                            .get(dep)
                            .filter(|record| !record.result.success && !step.optional)
                            .map(|record| (dep.clone(), record.result.error.clone()))
                    })
                });
                error = match failed_dep {
                    Some((dep, dep_error)) => {
                        format!("Step {} failed: {}", dep, dep_error)
                    }
                    None => "Circular dependency detected or missing dependencies".to_string(),
                };
                break;
            }

            let (parallel, serial): (Vec<WorkflowStep>, Vec<WorkflowStep>) =
                ready.into_iter().partition(|step| step.parallel_allowed);

            // Parallel steps go through the async service layer first
            let mut submissions = Vec::with_capacity(parallel.len());
            for step in parallel {
                let orchestrator = self.clone();
                let ctx = merged_ctx.clone();
                let completed_snapshot = completed.clone();
                let step_for_task = step.clone();
                let submission = self.service.submit(
                    "workflow_step",
                    0,
                    Box::new(move || {
                        async move {
                            let record = orchestrator
                                .execute_step(&step_for_task, &ctx, &completed_snapshot)
                                .await;
                            Ok(result_to_data(&record.result).with(
                                "record",
                                Value::Map(step_record_to_data(&record)),
                            ))
                        }
                        .boxed()
                    }),
                );
                submissions.push((step, submission));
            }

            // Serial steps run inline in declaration order
            for step in serial {
                let record = self.execute_step(&step, &merged_ctx, &completed).await;
                if !record.result.success && !step.optional && error.is_empty() {
                    error = format!("Step {} failed: {}", step.step_id, record.result.error);
                }
                record_step(&execution, &mut completed, record);
            }

            for (step, submission) in submissions {
                let record = match submission.wait().await {
                    Ok(data) => data
                        .get_map("record")
                        .map(data_to_step_record)
                        .unwrap_or_else(|| failed_record(&step, data_to_result(&data))),
                    Err(e) => failed_record(
                        &step,
                        FunctionResult::error(format!("Step execution exception: {}", e)),
                    ),
                };
                if !record.result.success && !step.optional && error.is_empty() {
                    error = format!("Step {} failed: {}", step.step_id, record.result.error);
                }
                record_step(&execution, &mut completed, record);
            }
        }

        let success = remaining.is_empty()
            && workflow.steps.iter().all(|step| {
                step.optional
                    || completed
                        .get(&step.step_id)
                        .map(|record| record.result.success)
                        .unwrap_or(false)
            });

        let mut execution = execution.lock();
        if execution.state != ExecutionState::Cancelled {
            execution.state = if success {
                ExecutionState::Completed
            } else {
                ExecutionState::Failed
            };
        }
        execution.success = success;
        execution.error = error;
        execution.ended_at = Some(chrono::Utc::now());
        info!(
            execution = %execution.execution_id,
            state = %execution.state,
            "workflow execution finished"
        );
    }

    /// Execute one step: resolve the agent, build the step context, pick
    /// the function (with substitutions), invoke with retries and the
    /// step timeout. Failures are annotated and recorded, never raised.
    async fn execute_step(
        &self,
        step: &WorkflowStep,
        ctx: &AgentData,
        completed: &BTreeMap<String, StepRecord>,
    ) -> StepRecord {
        let started_at = chrono::Utc::now();
        let started = std::time::Instant::now();

        let mut step_ctx = ctx.merged(&step.parameters);
        for dep in &step.dependencies {
            if let Some(record) = completed.get(dep) {
                if record.result.success {
                    step_ctx.set(format!("{}.result", dep), record.result.data.clone());
                }
            }
        }

        let (result, function_name, attempts) = match self.manager.resolve(&step.agent_id) {
            None => {
                warn!(
                    agent = %step.agent_id,
                    step = %step.step_id,
                    "agent not found for workflow step, continuing workflow"
                );
                (
                    FunctionResult::error(format!("Agent {} not found", step.agent_id)),
                    step.function_name.clone(),
                    1,
                )
            }
            Some(agent) => {
                let (function_name, step_ctx) =
                    resolve_function(&agent, &step.function_name, step_ctx);

                let max_attempts = 1 + step.retry_count;
                let mut attempts = 0;
                let mut result = FunctionResult::error("step never ran");
                while attempts < max_attempts {
                    attempts += 1;
                    result = invoke_with_timeout(
                        agent.clone(),
                        &function_name,
                        step_ctx.clone(),
                        step.timeout_ms,
                    )
                    .await;
                    if result.success {
                        break;
                    }
                }
                (result, function_name, attempts)
            }
        };

        let result = if result.success {
            result
        } else {
            warn!(
                step = %step.step_id,
                error = %result.error,
                "workflow step failed, continuing workflow"
            );
            // Annotate so downstream steps still see a usable shape
            let mut data = result.data.clone();
            data.set("error", result.error.clone());
            data.set("warning", "Function failed but workflow continued");
            data.set("step_id", step.step_id.clone());
            data.set("function_name", function_name.clone());
            FunctionResult::error_with_data(result.error, data)
        };

        let ended_at = chrono::Utc::now();
        StepRecord {
            step_id: step.step_id.clone(),
            function_name,
            result,
            started_at,
            ended_at,
            duration_ms: started.elapsed().as_millis() as u64,
            attempts,
        }
    }
}

/// Pick the function to call, applying the substitution table when the
/// requested one is absent.
fn resolve_function(
    agent: &Arc<Agent>,
    requested: &str,
    mut step_ctx: AgentData,
) -> (String, AgentData) {
    if agent.has_function(requested) {
        return (requested.to_string(), step_ctx);
    }

    if requested == "web_search" && agent.has_function("text_processing") {
        step_ctx.set("operation", "web_search_simulation");
        return ("text_processing".to_string(), step_ctx);
    }
    if requested == "code_generation" && agent.has_function("text_processing") {
        step_ctx.set("operation", "code_generation");
        return ("text_processing".to_string(), step_ctx);
    }
    if agent.has_function("inference") {
        let mut prompt = format!("Please perform the function: {} with parameters: ", requested);
        for (key, value) in step_ctx.iter() {
            if let Some(text) = value.as_str() {
                prompt.push_str(&format!("{}={} ", key, text));
            }
        }
        step_ctx.set("prompt", prompt);
        return ("inference".to_string(), step_ctx);
    }

    // No substitute; the dispatch failure message lists what exists
    (requested.to_string(), step_ctx)
}

async fn invoke_with_timeout(
    agent: Arc<Agent>,
    function_name: &str,
    params: AgentData,
    timeout_ms: u64,
) -> FunctionResult {
    if !agent.has_function(function_name) {
        return FunctionResult::error(format!(
            "Function '{}' not available. Available: {}",
            function_name,
            agent.function_names().join(", ")
        ));
    }

    if timeout_ms == 0 {
        return agent.execute_function(function_name, params).await;
    }

    // Spawn so the closure may finish after the deadline; its result is
    // simply discarded.
    let name = function_name.to_string();
    let handle = tokio::spawn(async move { agent.execute_function(&name, params).await });
    match tokio::time::timeout(Duration::from_millis(timeout_ms), handle).await {
        Ok(Ok(result)) => result,
        Ok(Err(join_error)) => {
            FunctionResult::error(format!("Step execution exception: {}", join_error))
        }
        Err(_) => FunctionResult::error("timeout"),
    }
}

fn dependencies_satisfied(step: &WorkflowStep, completed: &BTreeMap<String, StepRecord>) -> bool {
    step.dependencies.iter().all(|dep| {
        completed
            .get(dep)
            .map(|record| record.result.success || step.optional)
            .unwrap_or(false)
    })
}

fn record_step(
    execution: &Arc<Mutex<WorkflowExecution>>,
    completed: &mut BTreeMap<String, StepRecord>,
    record: StepRecord,
) {
    execution
        .lock()
        .step_results
        .insert(record.step_id.clone(), record.clone());
    completed.insert(record.step_id.clone(), record);
}

fn failed_record(step: &WorkflowStep, result: FunctionResult) -> StepRecord {
    let now = chrono::Utc::now();
    StepRecord {
        step_id: step.step_id.clone(),
        function_name: step.function_name.clone(),
        result,
        started_at: now,
        ended_at: now,
        duration_ms: 0,
        attempts: 1,
    }
}

fn step_record_to_data(record: &StepRecord) -> AgentData {
    AgentData::new()
        .with("step_id", record.step_id.clone())
        .with("function_name", record.function_name.clone())
        .with("result", result_to_data(&record.result))
        .with("started_at", record.started_at.to_rfc3339())
        .with("ended_at", record.ended_at.to_rfc3339())
        .with("duration_ms", record.duration_ms as i64)
        .with("attempts", record.attempts as i64)
}

fn data_to_step_record(data: &AgentData) -> StepRecord {
    let parse = |key: &str| {
        data.get_string(key)
            .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
            .map(|t| t.with_timezone(&chrono::Utc))
            .unwrap_or_else(chrono::Utc::now)
    };
    StepRecord {
        step_id: data.get_string_or("step_id", ""),
        function_name: data.get_string_or("function_name", ""),
        result: data
            .get_map("result")
            .map(data_to_result)
            .unwrap_or_else(|| FunctionResult::error("missing step result")),
        started_at: parse("started_at"),
        ended_at: parse("ended_at"),
        duration_ms: data.get_int_or("duration_ms", 0) as u64,
        attempts: data.get_int_or("attempts", 1) as u32,
    }
}
