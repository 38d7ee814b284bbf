// Troupe Server - Workflow routes
//
// Direct async function execution under /workflow/* and workflow
// definition/execution management under /workflows/*.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use futures::FutureExt;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use troupe_core::{AgentData, ExecutionState, FunctionResult, WorkflowDefinition};

use crate::error::ApiError;
use crate::metrics::WorkflowOutcome;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/workflow/execute", post(execute_direct))
        .route("/workflow/requests", get(list_requests))
        .route("/workflow/status", get(service_status))
        .route("/workflows", get(list_workflows).post(create_workflow))
        .route("/workflows/:id", axum::routing::delete(delete_workflow))
        .route("/workflows/execute", post(execute_workflow))
        .route("/workflows/executions/:id", get(get_execution))
        .route("/workflows/executions/:id/pause", put(pause_execution))
        .route("/workflows/executions/:id/resume", put(resume_execution))
        .route("/workflows/executions/:id/cancel", put(cancel_execution))
}

#[derive(Debug, Deserialize)]
struct DirectExecuteRequest {
    agent_id: String,
    function: String,

    #[serde(default)]
    parameters: serde_json::Value,

    #[serde(default)]
    priority: i32,
}

/// Submit one agent function call to the async service layer
async fn execute_direct(
    State(state): State<AppState>,
    Json(request): Json<DirectExecuteRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if state.manager.resolve(&request.agent_id).is_none() {
        return Err(ApiError::not_found("Agent not found"));
    }

    let parameters = match request.parameters {
        serde_json::Value::Null => AgentData::new(),
        value => AgentData::from_json_value(value)
            .map_err(|e| ApiError::bad_request(e.to_string()))?,
    };

    let manager = state.manager.clone();
    let agent_id = request.agent_id.clone();
    let function = request.function.clone();
    let submission = state.service.submit(
        "execute_function",
        request.priority,
        Box::new(move || {
            async move {
                let result = manager.execute(&agent_id, &function, parameters).await;
                Ok(function_result_data(&result))
            }
            .boxed()
        }),
    );

    Ok(Json(json!({ "request_id": submission.operation_id })))
}

async fn list_requests(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!(state.service.get_all_operations()))
}

async fn service_status(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "running": state.service.is_running(),
        "max_workers": state.service.worker_count(),
        "statistics": state.service.queue_statistics(),
    }))
}

async fn create_workflow(
    State(state): State<AppState>,
    Json(workflow): Json<WorkflowDefinition>,
) -> Result<impl IntoResponse, ApiError> {
    let workflow_id = workflow.id.clone();
    state.orchestrator.register_workflow(workflow)?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "workflow_id": workflow_id })),
    ))
}

async fn list_workflows(State(state): State<AppState>) -> Json<serde_json::Value> {
    let workflows = state.orchestrator.list_workflows();
    Json(json!({
        "workflows": workflows,
        "total_count": workflows.len(),
    }))
}

async fn delete_workflow(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if !state.orchestrator.remove_workflow(&id) {
        return Err(ApiError::not_found("Workflow not found"));
    }
    Ok(Json(json!({
        "message": "Workflow deleted successfully",
        "workflow_id": id,
    })))
}

#[derive(Debug, Deserialize)]
struct ExecuteWorkflowRequest {
    workflow_id: String,

    #[serde(default)]
    input_data: serde_json::Value,
}

async fn execute_workflow(
    State(state): State<AppState>,
    Json(request): Json<ExecuteWorkflowRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let input = match request.input_data {
        serde_json::Value::Null => AgentData::new(),
        value => AgentData::from_json_value(value)
            .map_err(|e| ApiError::bad_request(e.to_string()))?,
    };

    let execution_id = state
        .orchestrator
        .execute_workflow(&request.workflow_id, input)?;

    // Record the outcome once the execution reaches a terminal state
    let orchestrator = state.orchestrator.clone();
    let metrics = state.metrics.clone();
    let workflow_id = request.workflow_id.clone();
    let watch_id = execution_id.clone();
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(Duration::from_millis(50)).await;
            let Some(execution) = orchestrator.get_execution(&watch_id) else {
                break;
            };
            if execution.state.is_terminal() {
                let outcome = match execution.state {
                    ExecutionState::Completed => WorkflowOutcome::Success,
                    ExecutionState::Cancelled => WorkflowOutcome::Cancelled,
                    ExecutionState::Timeout => WorkflowOutcome::Timeout,
                    _ => WorkflowOutcome::Error,
                };
                let duration = execution.duration_ms().unwrap_or(0).max(0) as u64;
                metrics.record_workflow_execution(&workflow_id, outcome, duration);
                break;
            }
        }
    });

    Ok(Json(json!({ "execution_id": execution_id })))
}

async fn get_execution(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let execution = state
        .orchestrator
        .get_execution(&id)
        .ok_or_else(|| ApiError::not_found("Execution not found"))?;

    let value = serde_json::to_value(&execution)
        .map_err(|e| ApiError::internal(e.to_string()))?;
    Ok(Json(value))
}

async fn pause_execution(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    control_response(state.orchestrator.pause_execution(&id), "paused", &id, &state)
}

async fn resume_execution(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    control_response(state.orchestrator.resume_execution(&id), "resumed", &id, &state)
}

async fn cancel_execution(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    control_response(state.orchestrator.cancel_execution(&id), "cancelled", &id, &state)
}

/// Flatten a FunctionResult into the operation payload shape
fn function_result_data(result: &FunctionResult) -> AgentData {
    AgentData::new()
        .with("success", result.success)
        .with("data", result.data.clone())
        .with("error", result.error.clone())
}

fn control_response(
    changed: bool,
    action: &str,
    execution_id: &str,
    state: &AppState,
) -> Result<Json<serde_json::Value>, ApiError> {
    if !changed {
        if state.orchestrator.get_execution(execution_id).is_none() {
            return Err(ApiError::not_found("Execution not found"));
        }
        return Err(ApiError::bad_request(format!(
            "Execution cannot be {} in its current state",
            action
        )));
    }
    Ok(Json(json!({
        "message": format!("Execution {} successfully", action),
        "execution_id": execution_id,
    })))
}
