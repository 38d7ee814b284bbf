// Text statistics tool

use async_trait::async_trait;

use troupe_core::{AgentData, FunctionResult, FunctionSpec, ParameterSpec, ValueKind};

use crate::context::ToolContext;
use crate::registry::{Tool, ToolSchema};

/// Counts words, lines, and characters of a text
pub struct TextStatsTool {
    schema: ToolSchema,
}

impl TextStatsTool {
    pub fn new() -> Self {
        Self {
            schema: ToolSchema {
                spec: FunctionSpec::new(
                    "text_stats",
                    "Compute word, line, and character counts for a text",
                )
                .parameter(
                    ParameterSpec::new("text", ValueKind::String)
                        .required()
                        .describe("Text to analyze"),
                ),
                category: "text".to_string(),
                tags: vec!["nlp".to_string(), "analysis".to_string()],
                estimated_cost: 0.1,
            },
        }
    }
}

impl Default for TextStatsTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for TextStatsTool {
    fn schema(&self) -> &ToolSchema {
        &self.schema
    }

    async fn execute(&self, params: AgentData, _context: &ToolContext) -> FunctionResult {
        let text = params.get_string_or("text", "");
        let words = text.split_whitespace().count();
        let lines = if text.is_empty() { 0 } else { text.lines().count() };

        FunctionResult::ok(
            AgentData::new()
                .with("words", words)
                .with("lines", lines)
                .with("characters", text.chars().count()),
        )
    }
}
