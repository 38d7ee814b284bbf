// Timestamp tool

use async_trait::async_trait;
use chrono::Utc;

use troupe_core::{AgentData, FunctionResult, FunctionSpec, ParameterSpec, ValueKind};

use crate::context::ToolContext;
use crate::registry::{Tool, ToolSchema};

/// Current UTC time in several formats
pub struct TimestampTool {
    schema: ToolSchema,
}

impl TimestampTool {
    pub fn new() -> Self {
        Self {
            schema: ToolSchema {
                spec: FunctionSpec::new("timestamp", "Current UTC time").parameter(
                    ParameterSpec::new("format", ValueKind::String)
                        .describe("Output format")
                        .with_default("rfc3339")
                        .one_of(vec!["rfc3339".into(), "unix".into(), "unix_ms".into()]),
                ),
                category: "time".to_string(),
                tags: vec!["clock".to_string()],
                estimated_cost: 0.0,
            },
        }
    }
}

impl Default for TimestampTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for TimestampTool {
    fn schema(&self) -> &ToolSchema {
        &self.schema
    }

    async fn execute(&self, params: AgentData, _context: &ToolContext) -> FunctionResult {
        let now = Utc::now();
        let format = params.get_string_or("format", "rfc3339");

        let mut data = AgentData::new();
        match format.as_str() {
            "unix" => data.set("timestamp", now.timestamp()),
            "unix_ms" => data.set("timestamp", now.timestamp_millis()),
            _ => data.set("timestamp", now.to_rfc3339()),
        }
        data.set("format", format);

        FunctionResult::ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unix_format() {
        let tool = TimestampTool::new();
        let result = tool
            .execute(
                AgentData::new().with("format", "unix"),
                &ToolContext::new(),
            )
            .await;
        assert!(result.success);
        assert!(result.data.get_int("timestamp").unwrap() > 1_600_000_000);
    }
}
