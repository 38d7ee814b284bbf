// HTTP fetch tool
//
// GET/POST against arbitrary endpoints. Returns status, body, and timing;
// request failures are reported as failed results, not raised.

use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

use troupe_core::{AgentData, FunctionResult, FunctionSpec, ParameterSpec, ValueKind};

use crate::context::ToolContext;
use crate::registry::{Tool, ToolSchema};

pub struct HttpFetchTool {
    schema: ToolSchema,
}

impl HttpFetchTool {
    pub fn new() -> Self {
        Self {
            schema: ToolSchema {
                spec: FunctionSpec::new(
                    "http_fetch",
                    "Make an HTTP request. Returns status and body.",
                )
                .parameter(
                    ParameterSpec::new("url", ValueKind::String)
                        .required()
                        .describe("URL to request"),
                )
                .parameter(
                    ParameterSpec::new("method", ValueKind::String)
                        .describe("HTTP method")
                        .with_default("GET")
                        .one_of(vec!["GET".into(), "POST".into()]),
                )
                .parameter(
                    ParameterSpec::new("body", ValueKind::String).describe("Request body"),
                )
                .parameter(
                    ParameterSpec::new("timeout_secs", ValueKind::Integer)
                        .describe("Request timeout in seconds")
                        .with_default(30i64),
                )
                .timeout_ms(60_000),
                category: "network".to_string(),
                tags: vec!["http".to_string()],
                estimated_cost: 1.0,
            },
        }
    }
}

impl Default for HttpFetchTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for HttpFetchTool {
    fn schema(&self) -> &ToolSchema {
        &self.schema
    }

    async fn execute(&self, params: AgentData, _context: &ToolContext) -> FunctionResult {
        let url = params.get_string_or("url", "");
        let method = params.get_string_or("method", "GET");
        let timeout_secs = params.get_int_or("timeout_secs", 30).clamp(1, 300) as u64;

        debug!(%url, %method, "http_fetch");

        let client = match reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
        {
            Ok(client) => client,
            Err(e) => {
                return FunctionResult::error(format!("Failed to create HTTP client: {}", e))
            }
        };

        let mut request = match method.as_str() {
            "GET" => client.get(&url),
            "POST" => client.post(&url),
            other => return FunctionResult::error(format!("Unsupported method: {}", other)),
        };
        if let Some(body) = params.get_string("body") {
            request = request
                .header("Content-Type", "application/json")
                .body(body.to_string());
        }

        let started = std::time::Instant::now();
        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => return FunctionResult::error(format!("HTTP request failed: {}", e)),
        };
        let elapsed_ms = started.elapsed().as_millis() as i64;

        let status = response.status().as_u16() as i64;
        let body = match response.text().await {
            Ok(text) => text,
            Err(e) => return FunctionResult::error(format!("Failed to read response body: {}", e)),
        };

        FunctionResult::ok(
            AgentData::new()
                .with("status", status)
                .with("body", body)
                .with("elapsed_ms", elapsed_ms)
                .with("url", url),
        )
    }
}
