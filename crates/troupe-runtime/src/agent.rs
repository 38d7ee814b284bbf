// Troupe Runtime - Agent actor
//
// One named actor with a table of callable functions. Dispatch follows a
// fixed contract: running check, lookup, schema validation, concurrency
// cap, timed invocation, statistics update. Failures become FunctionResult
// values; nothing is raised across the dispatch boundary.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use troupe_core::{
    AgentData, AgentSettings, FunctionResult, FunctionSpec, ModelParameters, TroupeResult,
};
use troupe_tools::{ToolContext, ToolRegistry};

/// A callable hosted by an agent.
///
/// Mirrors the registry tool contract: a declared schema plus an async
/// execute. Implementations return domain errors through `TroupeResult`;
/// the agent converts them into failed results.
#[async_trait]
pub trait AgentFunction: Send + Sync {
    fn spec(&self) -> &FunctionSpec;

    async fn execute(&self, params: AgentData) -> TroupeResult<AgentData>;
}

/// Per-agent execution statistics
#[derive(Debug, Clone, Default, Serialize)]
pub struct AgentStatistics {
    pub total_functions_executed: u64,
    pub total_tools_executed: u64,
    pub total_plans_created: u64,
    pub average_execution_time_ms: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_activity: Option<DateTime<Utc>>,
}

struct AgentInner {
    functions: HashMap<String, Arc<dyn AgentFunction>>,
    stats: AgentStatistics,
    total_execution_time_ms: f64,
}

/// One named, stateful actor
pub struct Agent {
    id: String,
    name: String,
    agent_type: String,
    capabilities: Vec<String>,
    system_prompt: Option<String>,
    model: ModelParameters,
    heartbeat_interval_secs: u64,
    running: AtomicBool,
    concurrency: Arc<Semaphore>,
    max_concurrent_jobs: usize,
    tools: Arc<ToolRegistry>,
    inner: Mutex<AgentInner>,
}

impl Agent {
    pub fn new(
        id: impl Into<String>,
        settings: &AgentSettings,
        tools: Arc<ToolRegistry>,
    ) -> Self {
        let max_concurrent_jobs = settings.max_concurrent_jobs.max(1);
        Self {
            id: id.into(),
            name: settings.name.clone(),
            agent_type: settings.agent_type.clone(),
            capabilities: settings.capabilities.clone(),
            system_prompt: settings.system_prompt.clone(),
            model: settings.model.clone(),
            heartbeat_interval_secs: settings.heartbeat_interval_secs,
            running: AtomicBool::new(false),
            concurrency: Arc::new(Semaphore::new(max_concurrent_jobs)),
            max_concurrent_jobs,
            tools,
            inner: Mutex::new(AgentInner {
                functions: HashMap::new(),
                stats: AgentStatistics::default(),
                total_execution_time_ms: 0.0,
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn agent_type(&self) -> &str {
        &self.agent_type
    }

    pub fn capabilities(&self) -> &[String] {
        &self.capabilities
    }

    pub fn system_prompt(&self) -> Option<&str> {
        self.system_prompt.as_deref()
    }

    pub fn model(&self) -> &ModelParameters {
        &self.model
    }

    pub fn heartbeat_interval_secs(&self) -> u64 {
        self.heartbeat_interval_secs
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Begin accepting calls
    pub fn start(&self) {
        if !self.running.swap(true, Ordering::SeqCst) {
            debug!(agent = %self.name, "agent started");
        }
    }

    /// Stop accepting calls; in-flight calls finish
    pub fn stop(&self) {
        if self.running.swap(false, Ordering::SeqCst) {
            debug!(agent = %self.name, "agent stopped");
        }
    }

    /// Register a function; replaces any previous function of that name
    pub fn register_function(&self, function: Arc<dyn AgentFunction>) {
        let name = function.spec().name.clone();
        self.inner.lock().functions.insert(name, function);
    }

    pub fn unregister_function(&self, name: &str) -> bool {
        self.inner.lock().functions.remove(name).is_some()
    }

    pub fn has_function(&self, name: &str) -> bool {
        self.inner.lock().functions.contains_key(name)
    }

    pub fn function_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.lock().functions.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn statistics(&self) -> AgentStatistics {
        self.inner.lock().stats.clone()
    }

    pub fn record_plan_created(&self) {
        let mut inner = self.inner.lock();
        inner.stats.total_plans_created += 1;
        inner.stats.last_activity = Some(Utc::now());
    }

    pub fn record_tool_executed(&self) {
        let mut inner = self.inner.lock();
        inner.stats.total_tools_executed += 1;
        inner.stats.last_activity = Some(Utc::now());
    }

    /// Single dispatch entry point for both direct and workflow-driven
    /// calls; the concurrency cap is shared between the two.
    pub async fn execute_function(&self, name: &str, params: AgentData) -> FunctionResult {
        if !self.is_running() {
            return FunctionResult::error(format!("agent '{}' not running", self.name));
        }

        let function = {
            let inner = self.inner.lock();
            inner.functions.get(name).cloned()
        };
        let Some(function) = function else {
            return FunctionResult::error(format!("function '{}' not found", name));
        };

        if let Err(reason) = function.spec().validate(&params) {
            return FunctionResult::error(format!("invalid parameters: {}", reason));
        }
        let params = function.spec().apply_defaults(&params);

        // Counting semaphore; waiters queue here
        let permit = match self.concurrency.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => {
                return FunctionResult::error(format!("agent '{}' shutting down", self.name))
            }
        };

        let started = std::time::Instant::now();
        let result = function.execute(params).await;
        let elapsed_ms = started.elapsed().as_millis() as f64;
        drop(permit);

        self.record_execution(elapsed_ms);

        match result {
            Ok(data) => FunctionResult::ok(data),
            Err(e) => {
                warn!(agent = %self.name, function = %name, error = %e, "function failed");
                FunctionResult::error(e.to_string())
            }
        }
    }

    /// Execute a registry tool on behalf of this agent; shares the
    /// running check with function dispatch and counts toward the
    /// agent's tool statistics.
    pub async fn execute_tool(&self, name: &str, params: AgentData) -> FunctionResult {
        if !self.is_running() {
            return FunctionResult::error(format!("agent '{}' not running", self.name));
        }

        let context = ToolContext::for_agent(self.id.clone());
        let result = self.tools.execute(name, params, &context).await;
        self.record_tool_executed();
        result
    }

    fn record_execution(&self, elapsed_ms: f64) {
        let mut inner = self.inner.lock();
        inner.stats.total_functions_executed += 1;
        inner.total_execution_time_ms += elapsed_ms;
        inner.stats.average_execution_time_ms =
            inner.total_execution_time_ms / inner.stats.total_functions_executed as f64;
        inner.stats.last_activity = Some(Utc::now());
    }

    /// Summary used by listing endpoints
    pub fn info(&self) -> AgentData {
        let stats = self.statistics();
        AgentData::new()
            .with("id", self.id.clone())
            .with("name", self.name.clone())
            .with("type", self.agent_type.clone())
            .with("running", self.is_running())
            .with("capabilities", self.capabilities.clone())
            .with("functions", self.function_names())
            .with("max_concurrent_jobs", self.max_concurrent_jobs)
            .with(
                "statistics",
                AgentData::new()
                    .with("total_functions_executed", stats.total_functions_executed as i64)
                    .with("total_tools_executed", stats.total_tools_executed as i64)
                    .with("total_plans_created", stats.total_plans_created as i64)
                    .with(
                        "average_execution_time_ms",
                        stats.average_execution_time_ms,
                    ),
            )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::functions::closure_function;
    use std::time::Duration;
    use troupe_core::{ParameterSpec, TroupeError, ValueKind};

    fn test_agent() -> Agent {
        let mut settings = AgentSettings::new("tester");
        settings.max_concurrent_jobs = 2;
        let agent = Agent::new("agent-1", &settings, Arc::new(ToolRegistry::new()));
        agent.register_function(closure_function(
            FunctionSpec::new("capitalize", "Uppercase the text")
                .parameter(ParameterSpec::new("text", ValueKind::String).required()),
            |params| async move {
                Ok(AgentData::new()
                    .with("result", params.get_string_or("text", "").to_uppercase()))
            },
        ));
        agent
    }

    #[tokio::test]
    async fn test_not_running_refuses_calls() {
        let agent = test_agent();
        let result = agent
            .execute_function("capitalize", AgentData::new().with("text", "x"))
            .await;
        assert!(!result.success);
        assert!(result.error.contains("not running"));
    }

    #[tokio::test]
    async fn test_dispatch_order() {
        let agent = test_agent();
        agent.start();

        let unknown = agent.execute_function("nope", AgentData::new()).await;
        assert!(unknown.error.contains("function 'nope' not found"));

        let invalid = agent
            .execute_function("capitalize", AgentData::new())
            .await;
        assert!(invalid.error.contains("invalid parameters"));

        let ok = agent
            .execute_function("capitalize", AgentData::new().with("text", "hello"))
            .await;
        assert!(ok.success);
        assert_eq!(ok.data.get_string("result"), Some("HELLO"));
    }

    #[tokio::test]
    async fn test_statistics_updated() {
        let agent = test_agent();
        agent.start();
        for _ in 0..3 {
            agent
                .execute_function("capitalize", AgentData::new().with("text", "x"))
                .await;
        }
        let stats = agent.statistics();
        assert_eq!(stats.total_functions_executed, 3);
        assert!(stats.last_activity.is_some());
        assert!(stats.average_execution_time_ms >= 0.0);
    }

    #[tokio::test]
    async fn test_function_error_becomes_result() {
        let agent = test_agent();
        agent.register_function(closure_function(
            FunctionSpec::new("explode", ""),
            |_params| async move { Err(TroupeError::internal("kaboom")) },
        ));
        agent.start();

        let result = agent.execute_function("explode", AgentData::new()).await;
        assert!(!result.success);
        assert!(result.error.contains("kaboom"));
    }

    #[tokio::test]
    async fn test_concurrency_cap_serializes_excess_calls() {
        let mut settings = AgentSettings::new("narrow");
        settings.max_concurrent_jobs = 1;
        let agent = Arc::new(Agent::new(
            "agent-n",
            &settings,
            Arc::new(ToolRegistry::new()),
        ));
        agent.register_function(closure_function(
            FunctionSpec::new("sleepy", ""),
            |_params| async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok(AgentData::new())
            },
        ));
        agent.start();

        let started = std::time::Instant::now();
        let a = {
            let agent = agent.clone();
            tokio::spawn(async move { agent.execute_function("sleepy", AgentData::new()).await })
        };
        let b = {
            let agent = agent.clone();
            tokio::spawn(async move { agent.execute_function("sleepy", AgentData::new()).await })
        };
        assert!(a.await.unwrap().success);
        assert!(b.await.unwrap().success);
        // With a cap of one the second call waits for the first
        assert!(started.elapsed() >= Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_execute_tool_through_registry() {
        let settings = AgentSettings::new("tooled");
        let agent = Agent::new("agent-t", &settings, Arc::new(ToolRegistry::with_builtins()));

        let refused = agent
            .execute_tool("text_stats", AgentData::new().with("text", "a b"))
            .await;
        assert!(refused.error.contains("not running"));

        agent.start();
        let result = agent
            .execute_tool("text_stats", AgentData::new().with("text", "a b"))
            .await;
        assert!(result.success);
        assert_eq!(result.data.get_int("words"), Some(2));
        assert_eq!(agent.statistics().total_tools_executed, 1);
    }

    #[tokio::test]
    async fn test_info_summary() {
        let agent = test_agent();
        agent.start();
        let info = agent.info();
        assert_eq!(info.get_string("name"), Some("tester"));
        assert_eq!(info.get_bool("running"), Some(true));
        assert!(info.get_list("functions").unwrap().len() == 1);
    }
}
