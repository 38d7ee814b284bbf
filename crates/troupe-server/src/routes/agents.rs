// Troupe Server - Agent management routes
//
// CRUD over agents plus direct function execution and system status.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;

use troupe_core::{AgentData, AgentSettings, ModelParameters, RuntimeConfig};

use crate::error::ApiError;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/agents", get(list_agents).post(create_agent))
        .route("/v1/agents/:id", get(get_agent).delete(delete_agent))
        .route("/v1/agents/:id/start", put(start_agent))
        .route("/v1/agents/:id/stop", put(stop_agent))
        .route("/v1/agents/:id/execute", post(execute_function))
        .route("/v1/system/status", get(system_status))
        .route("/v1/system/reload", post(system_reload))
}

async fn list_agents(State(state): State<AppState>) -> Json<serde_json::Value> {
    let listing = state.manager.list();
    Json(json!({
        "agents": listing.to_json_value()["agents"],
        "total_count": state.manager.count(),
        "system_running": state.service.is_running(),
    }))
}

#[derive(Debug, Deserialize)]
struct CreateAgentRequest {
    name: String,

    #[serde(rename = "type", default)]
    agent_type: Option<String>,

    #[serde(default)]
    role: Option<String>,

    #[serde(default)]
    capabilities: Vec<String>,

    #[serde(default)]
    functions: Vec<String>,

    #[serde(default)]
    system_prompt: Option<String>,

    #[serde(default)]
    model: Option<ModelParameters>,

    #[serde(default)]
    config: Option<CreateAgentConfig>,
}

#[derive(Debug, Deserialize)]
struct CreateAgentConfig {
    #[serde(default = "default_true")]
    auto_start: bool,

    #[serde(default = "default_max_tasks")]
    max_concurrent_tasks: usize,

    #[serde(default = "default_heartbeat")]
    heartbeat_interval: u64,
}

fn default_true() -> bool {
    true
}

fn default_max_tasks() -> usize {
    troupe_core::DEFAULT_MAX_CONCURRENT_JOBS
}

fn default_heartbeat() -> u64 {
    5
}

async fn create_agent(
    State(state): State<AppState>,
    Json(request): Json<CreateAgentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if request.name.trim().is_empty() {
        return Err(ApiError::bad_request("Agent name required"));
    }

    let mut settings = AgentSettings::new(request.name);
    if let Some(agent_type) = request.agent_type {
        settings.agent_type = agent_type;
    } else if let Some(role) = request.role {
        settings.agent_type = role;
    }
    settings.capabilities = request.capabilities;
    settings.functions = request.functions;
    settings.system_prompt = request.system_prompt;
    if let Some(model) = request.model {
        settings.model = model;
    }
    if let Some(config) = request.config {
        settings.auto_start = config.auto_start;
        settings.max_concurrent_jobs = config.max_concurrent_tasks;
        settings.heartbeat_interval_secs = config.heartbeat_interval;
    }

    let started = settings.auto_start;
    let agent_id = state.manager.create(&settings)?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "agent_id": agent_id,
            "message": "Agent created successfully",
            "started": started,
        })),
    ))
}

async fn get_agent(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let agent = state
        .manager
        .get(&id)
        .ok_or_else(|| ApiError::not_found("Agent not found"))?;

    let stats = agent.statistics();
    Ok(Json(json!({
        "id": agent.id(),
        "name": agent.name(),
        "type": agent.agent_type(),
        "running": agent.is_running(),
        "capabilities": agent.capabilities(),
        "functions": agent.function_names(),
        "statistics": {
            "total_functions_executed": stats.total_functions_executed,
            "total_tools_executed": stats.total_tools_executed,
            "total_plans_created": stats.total_plans_created,
            "average_execution_time_ms": stats.average_execution_time_ms,
            "last_activity": stats.last_activity.map(|t| t.timestamp()),
        },
    })))
}

async fn start_agent(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if !state.manager.start(&id) {
        return Err(ApiError::not_found("Agent not found"));
    }
    Ok(Json(json!({
        "message": "Agent started successfully",
        "agent_id": id,
    })))
}

async fn stop_agent(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if !state.manager.stop(&id) {
        return Err(ApiError::not_found("Agent not found"));
    }
    Ok(Json(json!({
        "message": "Agent stopped successfully",
        "agent_id": id,
    })))
}

async fn delete_agent(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if !state.manager.delete(&id) {
        return Err(ApiError::not_found("Agent not found"));
    }
    Ok(Json(json!({
        "message": "Agent deleted successfully",
        "agent_id": id,
    })))
}

#[derive(Debug, Deserialize)]
struct ExecuteRequest {
    function: String,

    #[serde(default)]
    parameters: serde_json::Value,

    #[serde(default)]
    model: Option<String>,
}

async fn execute_function(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<ExecuteRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if state.manager.get(&id).is_none() {
        return Err(ApiError::not_found("Agent not found"));
    }
    if request.function.is_empty() {
        return Err(ApiError::bad_request("Function name required"));
    }

    let mut parameters = match request.parameters {
        serde_json::Value::Null => AgentData::new(),
        value => AgentData::from_json_value(value)
            .map_err(|e| ApiError::bad_request(e.to_string()))?,
    };
    if let Some(model) = request.model {
        parameters.set("model", model);
    }

    let started = std::time::Instant::now();
    let result = state.manager.execute(&id, &request.function, parameters).await;
    state
        .metrics
        .record_agent_operation(&id, started.elapsed().as_millis() as u64);

    let status = if result.success {
        StatusCode::OK
    } else {
        StatusCode::BAD_REQUEST
    };
    let mut body = json!({
        "success": result.success,
        "message": result.error,
        "function": request.function,
        "agent_id": id,
    });
    if result.success {
        body["result"] = result.data.to_json_value();
    }

    Ok((status, Json(body)))
}

async fn system_status(State(state): State<AppState>) -> Json<serde_json::Value> {
    let running = state.service.is_running();
    Json(json!({
        "system_running": running,
        "status": if running { "running" } else { "stopped" },
        "total_agents": state.manager.count(),
        "timestamp": chrono::Utc::now().timestamp(),
    }))
}

#[derive(Debug, Deserialize)]
struct ReloadRequest {
    config_file: String,
}

/// Re-read a configuration file and seed any agents it defines that do
/// not exist yet. Existing agents are left untouched.
async fn system_reload(
    State(state): State<AppState>,
    Json(request): Json<ReloadRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let content = tokio::fs::read_to_string(&request.config_file)
        .await
        .map_err(|e| {
            ApiError::bad_request(format!(
                "Failed to read config file {}: {}",
                request.config_file, e
            ))
        })?;

    let config: RuntimeConfig = serde_yaml::from_str(&content)
        .map_err(|e| ApiError::bad_request(format!("Failed to parse configuration: {}", e)))?;

    let mut created = 0;
    for settings in &config.agents {
        if state.manager.find_by_name(&settings.name).is_none() {
            state.manager.create(settings)?;
            created += 1;
        }
    }

    Ok(Json(json!({
        "message": "Configuration reloaded successfully",
        "config_file": request.config_file,
        "agents_created": created,
    })))
}
