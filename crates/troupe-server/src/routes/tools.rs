// Troupe Server - Tool discovery and execution routes

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;

use troupe_core::AgentData;
use troupe_tools::{ToolContext, ToolFilter};

use crate::error::ApiError;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/tools", get(discover_tools))
        .route("/v1/tools/:name/execute", post(execute_tool))
}

#[derive(Debug, Default, Deserialize)]
struct DiscoverQuery {
    category: Option<String>,
    tag: Option<String>,
    name: Option<String>,
    max_cost: Option<f64>,
}

async fn discover_tools(
    State(state): State<AppState>,
    Query(query): Query<DiscoverQuery>,
) -> Json<serde_json::Value> {
    let filter = ToolFilter {
        categories: query.category.into_iter().collect(),
        tags: query.tag.into_iter().collect(),
        name_pattern: query.name,
        max_cost: query.max_cost,
    };

    let registry = state.manager.tools();
    let schemas = registry.schemas(&filter);
    Json(json!({
        "tools": schemas,
        "total_count": schemas.len(),
        "categories": registry.categories(),
        "tags": registry.tags(),
    }))
}

#[derive(Debug, Deserialize)]
struct ExecuteToolRequest {
    #[serde(default)]
    parameters: serde_json::Value,

    /// Route the call through an agent so it shows in its statistics
    #[serde(default)]
    agent_id: Option<String>,
}

async fn execute_tool(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(request): Json<ExecuteToolRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let registry = state.manager.tools();
    if !registry.has(&name) {
        return Err(ApiError::not_found(format!("Tool not found: {}", name)));
    }

    let parameters = match request.parameters {
        serde_json::Value::Null => AgentData::new(),
        value => AgentData::from_json_value(value)
            .map_err(|e| ApiError::bad_request(e.to_string()))?,
    };

    let result = match request.agent_id {
        Some(agent_id) => {
            let agent = state
                .manager
                .resolve(&agent_id)
                .ok_or_else(|| ApiError::not_found("Agent not found"))?;
            agent.execute_tool(&name, parameters).await
        }
        None => {
            registry
                .execute(&name, parameters, &ToolContext::new())
                .await
        }
    };

    let status = if result.success {
        StatusCode::OK
    } else {
        StatusCode::BAD_REQUEST
    };
    Ok((
        status,
        Json(json!({
            "success": result.success,
            "tool": name,
            "result": result.data.to_json_value(),
            "error": result.error,
        })),
    ))
}
