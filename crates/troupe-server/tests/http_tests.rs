// HTTP surface tests driven through the router without sockets

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use troupe_core::{AgentSettings, RuntimeConfig};
use troupe_server::{build_router, AppState, LogBuffer};

async fn test_state() -> AppState {
    let mut config = RuntimeConfig::default();
    config.service.workers = 2;
    config.agents.push(AgentSettings::new("seeded"));
    AppState::from_config(config, LogBuffer::new()).unwrap()
}

async fn call(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = match body {
        Some(body) => Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

#[tokio::test]
async fn test_agent_lifecycle_over_http() {
    let state = test_state().await;
    let app = build_router(state.clone());

    // Listing includes the seeded agent
    let (status, body) = call(&app, Method::GET, "/v1/agents", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_count"], 1);
    assert_eq!(body["system_running"], true);

    // Create
    let (status, body) = call(
        &app,
        Method::POST,
        "/v1/agents",
        Some(json!({
            "name": "helper",
            "type": "worker",
            "capabilities": ["text"],
            "config": {"auto_start": true, "max_concurrent_tasks": 2, "heartbeat_interval": 5}
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["message"], "Agent created successfully");
    assert_eq!(body["started"], true);
    let agent_id = body["agent_id"].as_str().unwrap().to_string();

    // Duplicate name conflicts
    let (status, body) = call(
        &app,
        Method::POST,
        "/v1/agents",
        Some(json!({"name": "helper"})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], 409);

    // Detail
    let (status, body) = call(&app, Method::GET, &format!("/v1/agents/{}", agent_id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "helper");
    assert_eq!(body["running"], true);

    // Stop, start
    let (status, _) = call(
        &app,
        Method::PUT,
        &format!("/v1/agents/{}/stop", agent_id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = call(
        &app,
        Method::PUT,
        &format!("/v1/agents/{}/start", agent_id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    // Execute the built-in echo function
    let (status, body) = call(
        &app,
        Method::POST,
        &format!("/v1/agents/{}/execute", agent_id),
        Some(json!({"function": "echo", "parameters": {"ping": "pong"}})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["result"]["ping"], "pong");

    // Unknown function fails with a 400 and a message
    let (status, body) = call(
        &app,
        Method::POST,
        &format!("/v1/agents/{}/execute", agent_id),
        Some(json!({"function": "does_not_exist"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert!(body["message"].as_str().unwrap().contains("not found"));

    // Delete, then every reference 404s
    let (status, _) = call(
        &app,
        Method::DELETE,
        &format!("/v1/agents/{}", agent_id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let (status, body) = call(&app, Method::GET, &format!("/v1/agents/{}", agent_id), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["type"], "not_found");
    assert_eq!(body["error"]["code"], 404);

    state.service.shutdown().await;
}

#[tokio::test]
async fn test_system_status_shape() {
    let state = test_state().await;
    let app = build_router(state.clone());

    let (status, body) = call(&app, Method::GET, "/v1/system/status", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["system_running"], true);
    assert_eq!(body["status"], "running");
    assert_eq!(body["total_agents"], 1);
    assert!(body["timestamp"].as_i64().unwrap() > 0);

    state.service.shutdown().await;
}

#[tokio::test]
async fn test_workflow_crud_and_execution() {
    let state = test_state().await;
    let app = build_router(state.clone());
    let agent_id = state.manager.find_by_name("seeded").unwrap();

    // Create a two-step workflow over the built-in text_processing
    let workflow = json!({
        "id": "wf-http",
        "name": "http workflow",
        "type": "sequential",
        "steps": [
            {
                "step_id": "s1",
                "agent_id": agent_id,
                "function_name": "text_processing",
                "parameters": {"text": "hello", "operation": "uppercase"}
            },
            {
                "step_id": "s2",
                "agent_id": agent_id,
                "function_name": "echo",
                "dependencies": ["s1"]
            }
        ]
    });
    let (status, body) = call(&app, Method::POST, "/workflows", Some(workflow.clone())).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["workflow_id"], "wf-http");

    // Duplicate registration conflicts
    let (status, _) = call(&app, Method::POST, "/workflows", Some(workflow)).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = call(&app, Method::GET, "/workflows", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_count"], 1);

    // Execute and poll to completion
    let (status, body) = call(
        &app,
        Method::POST,
        "/workflows/execute",
        Some(json!({"workflow_id": "wf-http", "input_data": {}})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let execution_id = body["execution_id"].as_str().unwrap().to_string();

    let mut execution = Value::Null;
    for _ in 0..100 {
        let (status, body) = call(
            &app,
            Method::GET,
            &format!("/workflows/executions/{}", execution_id),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let state_tag = body["state"].as_str().unwrap_or_default().to_string();
        execution = body;
        if ["completed", "failed", "cancelled", "timeout"].contains(&state_tag.as_str()) {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
    assert_eq!(execution["state"], "completed");
    assert_eq!(execution["success"], true);
    assert_eq!(
        execution["step_results"]["s1"]["result"]["data"]["result"],
        "HELLO"
    );

    // Control endpoints reject terminal executions
    let (status, _) = call(
        &app,
        Method::PUT,
        &format!("/workflows/executions/{}/pause", execution_id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Unknown execution is a 404
    let (status, _) = call(
        &app,
        Method::PUT,
        "/workflows/executions/nope/cancel",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // Executing an unknown workflow is a 404
    let (status, _) = call(
        &app,
        Method::POST,
        "/workflows/execute",
        Some(json!({"workflow_id": "ghost"})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // Delete
    let (status, _) = call(&app, Method::DELETE, "/workflows/wf-http", None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = call(&app, Method::DELETE, "/workflows/wf-http", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    state.service.shutdown().await;
}

#[tokio::test]
async fn test_direct_execution_through_service_layer() {
    let state = test_state().await;
    let app = build_router(state.clone());
    let agent_id = state.manager.find_by_name("seeded").unwrap();

    let (status, body) = call(
        &app,
        Method::POST,
        "/workflow/execute",
        Some(json!({
            "agent_id": agent_id,
            "function": "echo",
            "parameters": {"n": 1}
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let request_id = body["request_id"].as_str().unwrap().to_string();
    assert!(request_id.starts_with("op_"));

    // The operation shows up in the request listing once processed
    let mut seen = false;
    for _ in 0..50 {
        let (_, body) = call(&app, Method::GET, "/workflow/requests", None).await;
        if body
            .as_array()
            .unwrap()
            .iter()
            .any(|op| op["operation_id"] == request_id.as_str()
                && op["status"] == "completed")
        {
            seen = true;
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
    assert!(seen);

    let (status, body) = call(&app, Method::GET, "/workflow/status", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["running"], true);
    assert!(body["max_workers"].as_u64().unwrap() >= 1);
    assert!(body["statistics"]["completed_operations"].as_u64().unwrap() >= 1);

    // Unknown agent is rejected up front
    let (status, _) = call(
        &app,
        Method::POST,
        "/workflow/execute",
        Some(json!({"agent_id": "ghost", "function": "echo"})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    state.service.shutdown().await;
}

#[tokio::test]
async fn test_metrics_counters_balance() {
    let state = test_state().await;
    let app = build_router(state.clone());

    call(&app, Method::GET, "/v1/agents", None).await;
    call(&app, Method::GET, "/v1/system/status", None).await;
    call(&app, Method::GET, "/v1/agents/ghost", None).await; // 404

    let (status, body) = call(&app, Method::GET, "/metrics", None).await;
    assert_eq!(status, StatusCode::OK);
    let total = body["requests"]["total_count"].as_u64().unwrap();
    let success = body["requests"]["success_count"].as_u64().unwrap();
    let error = body["requests"]["error_count"].as_u64().unwrap();
    assert_eq!(total, success + error);
    assert!(error >= 1);

    let (status, _) = call(&app, Method::GET, "/metrics/prometheus", None).await;
    assert_eq!(status, StatusCode::OK);

    state.service.shutdown().await;
}

#[tokio::test]
async fn test_logs_endpoint_shape() {
    let state = test_state().await;
    let app = build_router(state.clone());

    state.logs.push(troupe_server::LogEntry {
        timestamp: chrono::Utc::now(),
        level: "INFO".to_string(),
        target: "test".to_string(),
        message: "hello logs".to_string(),
    });

    let (status, body) = call(&app, Method::GET, "/v1/system/logs", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 1);
    assert_eq!(body["entries"][0]["message"], "hello logs");

    state.service.shutdown().await;
}

#[tokio::test]
async fn test_plan_routes() {
    let state = test_state().await;
    let app = build_router(state.clone());

    let (status, body) = call(
        &app,
        Method::POST,
        "/v1/plans",
        Some(json!({"goal": "research rust agent runtimes", "strategy": "sequential"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let plan_id = body["plan_id"].as_str().unwrap().to_string();
    assert_eq!(body["task_count"], 3);

    let (status, body) = call(&app, Method::GET, &format!("/v1/plans/{}", plan_id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["goal"], "research rust agent runtimes");
    assert_eq!(body["progress"], 0.0);

    let (status, body) = call(
        &app,
        Method::GET,
        &format!("/v1/plans/{}/ready", plan_id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 1);
    let first_task = body["tasks"][0]["id"].as_str().unwrap().to_string();

    // Completing the first task unlocks the second
    let (status, _) = call(
        &app,
        Method::PUT,
        &format!("/v1/plans/{}/tasks/{}/status", plan_id, first_task),
        Some(json!({"status": "completed"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let (_, body) = call(
        &app,
        Method::GET,
        &format!("/v1/plans/{}/ready", plan_id),
        None,
    )
    .await;
    assert_eq!(body["count"], 1);
    assert_ne!(body["tasks"][0]["id"], first_task.as_str());

    let (status, body) = call(
        &app,
        Method::GET,
        &format!("/v1/plans/{}/recommendation", plan_id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["recommendation"].as_str().unwrap().len() > 0);

    let (status, _) = call(&app, Method::GET, "/v1/plans/ghost", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    state.service.shutdown().await;
}

#[tokio::test]
async fn test_collaboration_routes() {
    let state = test_state().await;
    let app = build_router(state.clone());
    let agent_id = state.manager.find_by_name("seeded").unwrap();

    let (status, _) = call(
        &app,
        Method::POST,
        "/v1/collaboration/groups",
        Some(json!({
            "group_id": "g1",
            "pattern": "parallel",
            "agent_ids": [agent_id],
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    // Duplicate conflicts
    let (status, _) = call(
        &app,
        Method::POST,
        "/v1/collaboration/groups",
        Some(json!({
            "group_id": "g1",
            "pattern": "parallel",
            "agent_ids": [agent_id],
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (_, body) = call(&app, Method::GET, "/v1/collaboration/groups", None).await;
    assert_eq!(body["total_count"], 1);

    // The seeded agent carries the default process function
    let (status, body) = call(
        &app,
        Method::POST,
        "/v1/collaboration/groups/g1/execute",
        Some(json!({"input": {"n": 3}})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["result"]["success_count"], 1);

    let (status, _) = call(
        &app,
        Method::DELETE,
        "/v1/collaboration/groups/g1",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = call(
        &app,
        Method::POST,
        "/v1/collaboration/groups/g1/execute",
        Some(json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    state.service.shutdown().await;
}

#[tokio::test]
async fn test_tool_discovery_and_execution() {
    let state = test_state().await;
    let app = build_router(state.clone());
    let agent_id = state.manager.find_by_name("seeded").unwrap();

    let (status, body) = call(&app, Method::GET, "/v1/tools", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["total_count"].as_u64().unwrap() >= 3);
    assert!(body["categories"]
        .as_array()
        .unwrap()
        .iter()
        .any(|c| c == "text"));

    // Filter by category
    let (_, body) = call(&app, Method::GET, "/v1/tools?category=text", None).await;
    assert_eq!(body["total_count"], 1);
    assert_eq!(body["tools"][0]["spec"]["name"], "text_stats");

    // Execute standalone
    let (status, body) = call(
        &app,
        Method::POST,
        "/v1/tools/text_stats/execute",
        Some(json!({"parameters": {"text": "one two three"}})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["result"]["words"], 3);

    // Execute through an agent; counts toward its statistics
    let (status, _) = call(
        &app,
        Method::POST,
        "/v1/tools/text_stats/execute",
        Some(json!({"parameters": {"text": "a b"}, "agent_id": agent_id})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let agent = state.manager.get(&agent_id).unwrap();
    assert_eq!(agent.statistics().total_tools_executed, 1);

    // Missing parameters fail validation, unknown tools 404
    let (status, body) = call(
        &app,
        Method::POST,
        "/v1/tools/text_stats/execute",
        Some(json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("Invalid parameters"));

    let (status, _) = call(
        &app,
        Method::POST,
        "/v1/tools/ghost/execute",
        Some(json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    state.service.shutdown().await;
}
