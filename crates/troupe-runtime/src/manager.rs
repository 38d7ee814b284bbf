// Troupe Runtime - Agent manager
//
// Exclusive owner of all agents: one mutex around the id map plus a name
// index. Operations are short; the lock is never held across dispatch.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use troupe_core::{AgentData, AgentSettings, FunctionResult, TroupeError, TroupeResult, Value};
use troupe_llm::InferenceClient;
use troupe_tools::ToolRegistry;

use crate::agent::Agent;
use crate::functions::function_set_by_names;

#[derive(Default)]
struct ManagerInner {
    agents: HashMap<String, Arc<Agent>>,
    names: HashMap<String, String>,
}

/// Owns the id→agent map; names are unique
pub struct AgentManager {
    inner: Mutex<ManagerInner>,
    inference: Option<Arc<InferenceClient>>,
    tools: Arc<ToolRegistry>,
}

impl AgentManager {
    pub fn new(inference: Option<Arc<InferenceClient>>) -> Self {
        Self::with_tools(inference, Arc::new(ToolRegistry::with_builtins()))
    }

    pub fn with_tools(
        inference: Option<Arc<InferenceClient>>,
        tools: Arc<ToolRegistry>,
    ) -> Self {
        Self {
            inner: Mutex::new(ManagerInner::default()),
            inference,
            tools,
        }
    }

    /// The registry shared by every agent this manager owns
    pub fn tools(&self) -> &Arc<ToolRegistry> {
        &self.tools
    }

    /// Create an agent from settings; returns the fresh id.
    /// Duplicate names are a conflict.
    pub fn create(&self, settings: &AgentSettings) -> TroupeResult<String> {
        if settings.name.trim().is_empty() {
            return Err(TroupeError::validation("agent name required"));
        }

        let id = format!("agent_{}", Uuid::new_v4().simple());
        let agent = Arc::new(Agent::new(id.clone(), settings, self.tools.clone()));

        for function in function_set_by_names(
            &settings.functions,
            self.inference.clone(),
            &settings.model,
            settings.system_prompt.as_deref(),
        ) {
            agent.register_function(function);
        }

        {
            let mut inner = self.inner.lock();
            if inner.names.contains_key(&settings.name) {
                return Err(TroupeError::conflict(format!(
                    "agent name '{}' already exists",
                    settings.name
                )));
            }
            inner.names.insert(settings.name.clone(), id.clone());
            inner.agents.insert(id.clone(), agent.clone());
        }

        if settings.auto_start {
            agent.start();
        }

        info!(agent = %settings.name, id = %id, "created agent");
        Ok(id)
    }

    pub fn get(&self, id: &str) -> Option<Arc<Agent>> {
        self.inner.lock().agents.get(id).cloned()
    }

    /// Resolve by id first, then by name
    pub fn resolve(&self, id_or_name: &str) -> Option<Arc<Agent>> {
        let inner = self.inner.lock();
        if let Some(agent) = inner.agents.get(id_or_name) {
            return Some(agent.clone());
        }
        inner
            .names
            .get(id_or_name)
            .and_then(|id| inner.agents.get(id))
            .cloned()
    }

    pub fn find_by_name(&self, name: &str) -> Option<String> {
        self.inner.lock().names.get(name).cloned()
    }

    pub fn start(&self, id: &str) -> bool {
        match self.get(id) {
            Some(agent) => {
                agent.start();
                true
            }
            None => false,
        }
    }

    pub fn stop(&self, id: &str) -> bool {
        match self.get(id) {
            Some(agent) => {
                agent.stop();
                true
            }
            None => false,
        }
    }

    /// Stop first, then remove
    pub fn delete(&self, id: &str) -> bool {
        let mut inner = self.inner.lock();
        let Some(agent) = inner.agents.remove(id) else {
            return false;
        };
        agent.stop();
        inner.names.remove(agent.name());
        info!(agent = %agent.name(), id = %id, "deleted agent");
        true
    }

    pub fn agent_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.inner.lock().agents.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn count(&self) -> usize {
        self.inner.lock().agents.len()
    }

    pub fn running_count(&self) -> usize {
        self.inner
            .lock()
            .agents
            .values()
            .filter(|a| a.is_running())
            .count()
    }

    /// Listing summary: `{agents: [...], total_count, running_count}`
    pub fn list(&self) -> AgentData {
        let agents: Vec<Arc<Agent>> = {
            let inner = self.inner.lock();
            inner.agents.values().cloned().collect()
        };

        let mut summaries: Vec<(String, Value)> = agents
            .iter()
            .map(|a| (a.id().to_string(), Value::Map(a.info())))
            .collect();
        summaries.sort_by(|a, b| a.0.cmp(&b.0));

        let running = agents.iter().filter(|a| a.is_running()).count();
        AgentData::new()
            .with(
                "agents",
                Value::List(summaries.into_iter().map(|(_, v)| v).collect()),
            )
            .with("total_count", agents.len())
            .with("running_count", running)
    }

    /// Look up, then delegate to the agent's dispatch contract
    pub async fn execute(
        &self,
        id: &str,
        function_name: &str,
        params: AgentData,
    ) -> FunctionResult {
        match self.get(id) {
            Some(agent) => agent.execute_function(function_name, params).await,
            None => FunctionResult::error(format!("Agent {} not found", id)),
        }
    }

    /// Idempotent bulk stop
    pub fn stop_all(&self) {
        let agents: Vec<Arc<Agent>> = {
            let inner = self.inner.lock();
            inner.agents.values().cloned().collect()
        };
        for agent in agents {
            agent.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> AgentManager {
        AgentManager::new(None)
    }

    #[test]
    fn test_create_and_lookup() {
        let mgr = manager();
        let id = mgr.create(&AgentSettings::new("alpha")).unwrap();

        assert!(mgr.get(&id).is_some());
        assert_eq!(mgr.find_by_name("alpha"), Some(id.clone()));
        assert!(mgr.resolve("alpha").is_some());
        assert_eq!(mgr.count(), 1);
        // auto_start defaults to true
        assert_eq!(mgr.running_count(), 1);
    }

    #[test]
    fn test_duplicate_name_conflicts() {
        let mgr = manager();
        mgr.create(&AgentSettings::new("alpha")).unwrap();
        let err = mgr.create(&AgentSettings::new("alpha")).unwrap_err();
        assert!(matches!(err, TroupeError::Conflict(_)));
    }

    #[test]
    fn test_delete_stops_and_removes() {
        let mgr = manager();
        let id = mgr.create(&AgentSettings::new("alpha")).unwrap();
        assert!(mgr.delete(&id));
        assert!(mgr.get(&id).is_none());
        assert!(mgr.find_by_name("alpha").is_none());
        assert!(!mgr.delete(&id));
    }

    #[tokio::test]
    async fn test_execute_after_delete_fails() {
        let mgr = manager();
        let id = mgr.create(&AgentSettings::new("alpha")).unwrap();
        mgr.delete(&id);

        let result = mgr.execute(&id, "echo", AgentData::new()).await;
        assert!(!result.success);
        assert!(result.error.contains("not found"));
    }

    #[tokio::test]
    async fn test_execute_delegates() {
        let mgr = manager();
        let id = mgr.create(&AgentSettings::new("alpha")).unwrap();
        let result = mgr
            .execute(&id, "echo", AgentData::new().with("k", "v"))
            .await;
        assert!(result.success);
        assert_eq!(result.data.get_string("k"), Some("v"));
    }

    #[test]
    fn test_list_shape() {
        let mgr = manager();
        mgr.create(&AgentSettings::new("a")).unwrap();
        let mut stopped = AgentSettings::new("b");
        stopped.auto_start = false;
        mgr.create(&stopped).unwrap();

        let listing = mgr.list();
        assert_eq!(listing.get_int("total_count"), Some(2));
        assert_eq!(listing.get_int("running_count"), Some(1));
        assert_eq!(listing.get_list("agents").unwrap().len(), 2);
    }

    #[test]
    fn test_stop_all_idempotent() {
        let mgr = manager();
        mgr.create(&AgentSettings::new("a")).unwrap();
        mgr.create(&AgentSettings::new("b")).unwrap();
        mgr.stop_all();
        mgr.stop_all();
        assert_eq!(mgr.running_count(), 0);
    }
}
