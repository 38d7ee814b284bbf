// Troupe Server - Shared application state

use std::sync::Arc;

use troupe_core::RuntimeConfig;
use troupe_llm::InferenceClient;
use troupe_runtime::{
    AgentManager, AsyncServiceLayer, CollaborationEngine, PlanningSystem, ReasoningSystem,
    WorkflowOrchestrator,
};

use crate::metrics::MetricsCollector;
use crate::telemetry::LogBuffer;

/// Everything the handlers need, cheaply cloneable
#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<AgentManager>,
    pub service: Arc<AsyncServiceLayer>,
    pub orchestrator: Arc<WorkflowOrchestrator>,
    pub collaboration: Arc<CollaborationEngine>,
    pub planning: Arc<PlanningSystem>,
    pub reasoning: Arc<ReasoningSystem>,
    pub metrics: Arc<MetricsCollector>,
    pub logs: LogBuffer,
    pub config: Arc<RuntimeConfig>,
}

impl AppState {
    /// Wire the full runtime from configuration. The service layer is
    /// started; configured agents are seeded.
    pub fn from_config(config: RuntimeConfig, logs: LogBuffer) -> troupe_core::TroupeResult<Self> {
        let inference = match InferenceClient::new(config.inference.clone()) {
            Ok(client) => Some(Arc::new(client)),
            Err(e) => {
                tracing::warn!(error = %e, "inference client unavailable, continuing without it");
                None
            }
        };

        let manager = Arc::new(AgentManager::new(inference));
        let service = Arc::new(AsyncServiceLayer::new(
            config.service.workers,
            config.service.max_queue_size,
        ));
        service.start();

        for settings in &config.agents {
            manager.create(settings)?;
        }

        let orchestrator = Arc::new(WorkflowOrchestrator::new(manager.clone(), service.clone()));
        let collaboration = Arc::new(CollaborationEngine::new(manager.clone()));
        let planning = Arc::new(PlanningSystem::new());
        let reasoning = Arc::new(ReasoningSystem::new());

        Ok(Self {
            manager,
            service,
            orchestrator,
            collaboration,
            planning,
            reasoning,
            metrics: Arc::new(MetricsCollector::new()),
            logs,
            config: Arc::new(config),
        })
    }
}
