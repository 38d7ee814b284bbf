// Troupe Server - Planning and collaboration routes

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;

use troupe_core::{
    AgentData, CollaborationGroup, CollaborationPattern, PlanningStrategy, TaskStatus,
};
use troupe_runtime::PlanningCoordinator;

use crate::error::ApiError;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/plans", get(list_plans).post(create_plan))
        .route("/v1/plans/:id", get(get_plan))
        .route("/v1/plans/:id/ready", get(ready_tasks))
        .route("/v1/plans/:id/recommendation", get(recommend_next))
        .route("/v1/plans/:id/tasks/:task_id/status", put(update_task_status))
        .route(
            "/v1/collaboration/groups",
            get(list_groups).post(create_group),
        )
        .route(
            "/v1/collaboration/groups/:id",
            axum::routing::delete(delete_group),
        )
        .route("/v1/collaboration/groups/:id/execute", post(execute_group))
}

#[derive(Debug, Deserialize)]
struct CreatePlanRequest {
    goal: String,

    #[serde(default)]
    context: String,

    #[serde(default = "default_strategy")]
    strategy: PlanningStrategy,
}

fn default_strategy() -> PlanningStrategy {
    PlanningStrategy::DependencyAware
}

async fn create_plan(
    State(state): State<AppState>,
    Json(request): Json<CreatePlanRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if request.goal.trim().is_empty() {
        return Err(ApiError::bad_request("Goal required"));
    }

    let plan = state
        .planning
        .decompose_goal(&request.goal, &request.context, request.strategy);
    let plan_id = plan.id.clone();
    let task_count = plan.tasks.len();
    state.planning.add_plan(plan)?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "plan_id": plan_id,
            "task_count": task_count,
            "message": "Plan created successfully",
        })),
    ))
}

async fn list_plans(State(state): State<AppState>) -> Json<serde_json::Value> {
    let ids = state.planning.active_plan_ids();
    Json(json!({
        "plans": ids,
        "total_count": ids.len(),
    }))
}

async fn get_plan(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let plan = state
        .planning
        .get_plan(&id)
        .ok_or_else(|| ApiError::not_found("Plan not found"))?;

    let mut value = serde_json::to_value(&plan).map_err(|e| ApiError::internal(e.to_string()))?;
    value["progress"] = json!(plan.progress());
    value["summary"] = json!(state.planning.summary(&id));
    Ok(Json(value))
}

async fn ready_tasks(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if state.planning.get_plan(&id).is_none() {
        return Err(ApiError::not_found("Plan not found"));
    }
    let tasks = state.planning.get_ready_tasks(&id);
    Ok(Json(json!({
        "tasks": tasks,
        "count": tasks.len(),
    })))
}

async fn recommend_next(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if state.planning.get_plan(&id).is_none() {
        return Err(ApiError::not_found("Plan not found"));
    }
    let coordinator = PlanningCoordinator::new(state.planning.clone(), state.reasoning.clone());
    Ok(Json(json!({
        "plan_id": id,
        "recommendation": coordinator.recommend_next_action(&id, "current state"),
    })))
}

#[derive(Debug, Deserialize)]
struct TaskStatusRequest {
    status: TaskStatus,

    #[serde(default)]
    error: Option<String>,
}

async fn update_task_status(
    State(state): State<AppState>,
    Path((id, task_id)): Path<(String, String)>,
    Json(request): Json<TaskStatusRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if !state
        .planning
        .update_task_status(&id, &task_id, request.status, request.error.as_deref())
    {
        return Err(ApiError::not_found("Plan or task not found"));
    }
    Ok(Json(json!({
        "message": "Task status updated",
        "plan_id": id,
        "task_id": task_id,
    })))
}

#[derive(Debug, Deserialize)]
struct CreateGroupRequest {
    group_id: String,

    #[serde(default)]
    name: Option<String>,

    pattern: CollaborationPattern,

    agent_ids: Vec<String>,

    #[serde(default)]
    consensus_threshold: Option<usize>,

    #[serde(default)]
    max_negotiation_rounds: Option<usize>,
}

async fn create_group(
    State(state): State<AppState>,
    Json(request): Json<CreateGroupRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if request.agent_ids.is_empty() {
        return Err(ApiError::bad_request("At least one agent id required"));
    }

    let mut group = CollaborationGroup::new(
        request.group_id.clone(),
        request.name.unwrap_or_else(|| request.group_id.clone()),
        request.pattern,
        request.agent_ids,
    );
    if let Some(threshold) = request.consensus_threshold {
        group = group.with_threshold(threshold);
    }
    if let Some(rounds) = request.max_negotiation_rounds {
        group = group.with_negotiation_rounds(rounds);
    }

    state.collaboration.create_group(group)?;
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "group_id": request.group_id,
            "message": "Collaboration group created successfully",
        })),
    ))
}

async fn list_groups(State(state): State<AppState>) -> Json<serde_json::Value> {
    let groups = state.collaboration.list_groups();
    Json(json!({
        "groups": groups,
        "total_count": groups.len(),
    }))
}

async fn delete_group(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if !state.collaboration.remove_group(&id) {
        return Err(ApiError::not_found("Collaboration group not found"));
    }
    Ok(Json(json!({
        "message": "Collaboration group deleted successfully",
        "group_id": id,
    })))
}

#[derive(Debug, Deserialize)]
struct ExecuteGroupRequest {
    #[serde(default)]
    input: serde_json::Value,
}

async fn execute_group(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<ExecuteGroupRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let input = match request.input {
        serde_json::Value::Null => AgentData::new(),
        value => AgentData::from_json_value(value)
            .map_err(|e| ApiError::bad_request(e.to_string()))?,
    };

    let result = state.collaboration.execute(&id, input).await?;
    Ok(Json(json!({
        "group_id": id,
        "result": result.to_json_value(),
    })))
}
