// Troupe Tools - Tool registry
//
// Name-keyed catalog with category and tag indices kept in lockstep under
// one mutex; the three structures always mutate together.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use troupe_core::{AgentData, FunctionResult, FunctionSpec};

use crate::context::ToolContext;

/// Schema advertised by a tool: the function schema plus catalog metadata
#[derive(Debug, Clone, serde::Serialize)]
pub struct ToolSchema {
    pub spec: FunctionSpec,
    pub category: String,
    pub tags: Vec<String>,
    pub estimated_cost: f64,
}

impl ToolSchema {
    pub fn name(&self) -> &str {
        &self.spec.name
    }
}

/// A registry-hosted callable shared across agents
#[async_trait]
pub trait Tool: Send + Sync {
    fn schema(&self) -> &ToolSchema;

    async fn execute(&self, params: AgentData, context: &ToolContext) -> FunctionResult;

    /// Estimated cost of one invocation with the given parameters
    fn estimate_cost(&self, _params: &AgentData) -> f64 {
        self.schema().estimated_cost
    }
}

/// Discovery filter; every present constraint must match
#[derive(Debug, Clone, Default)]
pub struct ToolFilter {
    /// ANY of these categories (when non-empty)
    pub categories: Vec<String>,

    /// ANY of these tags (when non-empty)
    pub tags: Vec<String>,

    /// Regex on the tool name; falls back to case-insensitive substring
    /// when the pattern does not compile
    pub name_pattern: Option<String>,

    /// Upper bound on estimated cost
    pub max_cost: Option<f64>,
}

impl ToolFilter {
    pub fn matches(&self, tool: &dyn Tool, params: &AgentData) -> bool {
        let schema = tool.schema();

        if !self.categories.is_empty() && !self.categories.contains(&schema.category) {
            return false;
        }

        if !self.tags.is_empty() && !self.tags.iter().any(|t| schema.tags.contains(t)) {
            return false;
        }

        if let Some(pattern) = &self.name_pattern {
            match regex::RegexBuilder::new(pattern)
                .case_insensitive(true)
                .build()
            {
                Ok(re) => {
                    if !re.is_match(schema.name()) {
                        return false;
                    }
                }
                Err(_) => {
                    let name = schema.name().to_ascii_lowercase();
                    if !name.contains(&pattern.to_ascii_lowercase()) {
                        return false;
                    }
                }
            }
        }

        if let Some(max_cost) = self.max_cost {
            if tool.estimate_cost(params) > max_cost {
                return false;
            }
        }

        true
    }
}

#[derive(Default)]
struct RegistryInner {
    tools: HashMap<String, Arc<dyn Tool>>,
    category_index: HashMap<String, Vec<String>>,
    tag_index: HashMap<String, Vec<String>>,
}

/// Global tool catalog
#[derive(Default)]
pub struct ToolRegistry {
    inner: Mutex<RegistryInner>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-loaded with the built-in tools
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        for tool in crate::tools::builtin_tools() {
            let _ = registry.register(tool);
        }
        registry
    }

    /// Register a tool; fails on duplicate names
    pub fn register(&self, tool: Arc<dyn Tool>) -> Result<(), String> {
        let mut inner = self.inner.lock();
        let name = tool.schema().name().to_string();

        if inner.tools.contains_key(&name) {
            warn!(tool = %name, "tool already registered");
            return Err(format!("tool already registered: {}", name));
        }

        let category = tool.schema().category.clone();
        inner
            .category_index
            .entry(category)
            .or_default()
            .push(name.clone());
        for tag in &tool.schema().tags {
            inner
                .tag_index
                .entry(tag.clone())
                .or_default()
                .push(name.clone());
        }
        inner.tools.insert(name.clone(), tool);

        info!(tool = %name, "registered tool");
        Ok(())
    }

    pub fn unregister(&self, name: &str) -> bool {
        let mut inner = self.inner.lock();
        let Some(tool) = inner.tools.remove(name) else {
            return false;
        };

        let category = tool.schema().category.clone();
        if let Some(names) = inner.category_index.get_mut(&category) {
            names.retain(|n| n != name);
            if names.is_empty() {
                inner.category_index.remove(&category);
            }
        }
        for tag in tool.schema().tags.clone() {
            if let Some(names) = inner.tag_index.get_mut(&tag) {
                names.retain(|n| n != name);
                if names.is_empty() {
                    inner.tag_index.remove(&tag);
                }
            }
        }

        info!(tool = %name, "unregistered tool");
        true
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.inner.lock().tools.get(name).cloned()
    }

    pub fn has(&self, name: &str) -> bool {
        self.inner.lock().tools.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().tools.is_empty()
    }

    /// Names of tools matching the filter
    pub fn discover(&self, filter: &ToolFilter) -> Vec<String> {
        let inner = self.inner.lock();
        let params = AgentData::new();
        let mut names: Vec<String> = inner
            .tools
            .values()
            .filter(|tool| filter.matches(tool.as_ref(), &params))
            .map(|tool| tool.schema().name().to_string())
            .collect();
        names.sort();
        names
    }

    /// Schemas of tools matching the filter
    pub fn schemas(&self, filter: &ToolFilter) -> Vec<ToolSchema> {
        let inner = self.inner.lock();
        let params = AgentData::new();
        let mut schemas: Vec<ToolSchema> = inner
            .tools
            .values()
            .filter(|tool| filter.matches(tool.as_ref(), &params))
            .map(|tool| tool.schema().clone())
            .collect();
        schemas.sort_by(|a, b| a.spec.name.cmp(&b.spec.name));
        schemas
    }

    pub fn categories(&self) -> Vec<String> {
        let mut categories: Vec<String> =
            self.inner.lock().category_index.keys().cloned().collect();
        categories.sort();
        categories
    }

    pub fn tags(&self) -> Vec<String> {
        let mut tags: Vec<String> = self.inner.lock().tag_index.keys().cloned().collect();
        tags.sort();
        tags
    }

    pub fn tools_in_category(&self, category: &str) -> Vec<String> {
        self.inner
            .lock()
            .category_index
            .get(category)
            .cloned()
            .unwrap_or_default()
    }

    pub fn tools_with_tag(&self, tag: &str) -> Vec<String> {
        self.inner
            .lock()
            .tag_index
            .get(tag)
            .cloned()
            .unwrap_or_default()
    }

    /// Execute a tool by name. Parameter validation failures and tool
    /// errors are reported as failed results, never raised.
    pub async fn execute(
        &self,
        name: &str,
        params: AgentData,
        context: &ToolContext,
    ) -> FunctionResult {
        let Some(tool) = self.get(name) else {
            return FunctionResult::error(format!("Tool not found: {}", name));
        };

        if let Err(reason) = tool.schema().spec.validate(&params) {
            return FunctionResult::error(format!(
                "Invalid parameters for tool {}: {}",
                name, reason
            ));
        }

        debug!(tool = %name, "executing tool");
        let params = tool.schema().spec.apply_defaults(&params);
        let result = tool.execute(params, context).await;
        if !result.success && result.error.is_empty() {
            return FunctionResult::error(format!("Tool execution error: {}", name));
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use troupe_core::{ParameterSpec, ValueKind};

    struct MockTool {
        schema: ToolSchema,
        fail: bool,
    }

    impl MockTool {
        fn new(name: &str, category: &str, tags: &[&str], cost: f64) -> Self {
            Self {
                schema: ToolSchema {
                    spec: FunctionSpec::new(name, format!("Mock tool {}", name))
                        .parameter(ParameterSpec::new("input", ValueKind::String).required()),
                    category: category.to_string(),
                    tags: tags.iter().map(|t| t.to_string()).collect(),
                    estimated_cost: cost,
                },
                fail: false,
            }
        }

        fn failing(mut self) -> Self {
            self.fail = true;
            self
        }
    }

    #[async_trait]
    impl Tool for MockTool {
        fn schema(&self) -> &ToolSchema {
            &self.schema
        }

        async fn execute(&self, params: AgentData, _context: &ToolContext) -> FunctionResult {
            if self.fail {
                FunctionResult::error("Tool execution error: simulated failure")
            } else {
                FunctionResult::ok(
                    AgentData::new().with("echo", params.get_string_or("input", "")),
                )
            }
        }
    }

    fn registry_with(tools: Vec<MockTool>) -> ToolRegistry {
        let registry = ToolRegistry::new();
        for tool in tools {
            registry.register(Arc::new(tool)).unwrap();
        }
        registry
    }

    #[test]
    fn test_register_rejects_duplicates() {
        let registry = ToolRegistry::new();
        registry
            .register(Arc::new(MockTool::new("t", "text", &[], 1.0)))
            .unwrap();
        assert!(registry
            .register(Arc::new(MockTool::new("t", "text", &[], 1.0)))
            .is_err());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_unregister_cleans_indices() {
        let registry = registry_with(vec![MockTool::new("t", "text", &["nlp"], 1.0)]);
        assert_eq!(registry.categories(), vec!["text"]);
        assert!(registry.unregister("t"));
        assert!(registry.categories().is_empty());
        assert!(registry.tags().is_empty());
        assert!(!registry.unregister("t"));
    }

    #[test]
    fn test_discover_by_category_and_tag() {
        let registry = registry_with(vec![
            MockTool::new("summarize", "text", &["nlp"], 2.0),
            MockTool::new("translate", "text", &["nlp", "i18n"], 5.0),
            MockTool::new("fetch", "network", &["http"], 1.0),
        ]);

        let filter = ToolFilter {
            categories: vec!["text".into()],
            ..Default::default()
        };
        assert_eq!(registry.discover(&filter), vec!["summarize", "translate"]);

        let filter = ToolFilter {
            tags: vec!["i18n".into()],
            ..Default::default()
        };
        assert_eq!(registry.discover(&filter), vec!["translate"]);
    }

    #[test]
    fn test_discover_by_name_pattern_and_cost() {
        let registry = registry_with(vec![
            MockTool::new("summarize", "text", &[], 2.0),
            MockTool::new("translate", "text", &[], 5.0),
        ]);

        let filter = ToolFilter {
            name_pattern: Some("^sum".into()),
            ..Default::default()
        };
        assert_eq!(registry.discover(&filter), vec!["summarize"]);

        // Broken regex falls back to substring matching
        let filter = ToolFilter {
            name_pattern: Some("TRANS(".into()),
            ..Default::default()
        };
        assert!(registry.discover(&filter).is_empty());
        let filter = ToolFilter {
            name_pattern: Some("TRANS".into()),
            ..Default::default()
        };
        assert_eq!(registry.discover(&filter), vec!["translate"]);

        let filter = ToolFilter {
            max_cost: Some(3.0),
            ..Default::default()
        };
        assert_eq!(registry.discover(&filter), vec!["summarize"]);
    }

    #[tokio::test]
    async fn test_execute_validates_parameters() {
        let registry = registry_with(vec![MockTool::new("t", "text", &[], 1.0)]);
        let result = registry
            .execute("t", AgentData::new(), &ToolContext::new())
            .await;
        assert!(!result.success);
        assert!(result.error.starts_with("Invalid parameters"));
    }

    #[tokio::test]
    async fn test_execute_success_and_missing() {
        let registry = registry_with(vec![MockTool::new("t", "text", &[], 1.0)]);
        let result = registry
            .execute(
                "t",
                AgentData::new().with("input", "ping"),
                &ToolContext::new(),
            )
            .await;
        assert!(result.success);
        assert_eq!(result.data.get_string("echo"), Some("ping"));

        let missing = registry
            .execute("nope", AgentData::new(), &ToolContext::new())
            .await;
        assert!(!missing.success);
        assert!(missing.error.contains("Tool not found"));
    }

    #[tokio::test]
    async fn test_execute_wraps_tool_failure() {
        let registry = ToolRegistry::new();
        registry
            .register(Arc::new(MockTool::new("bad", "text", &[], 1.0).failing()))
            .unwrap();
        let result = registry
            .execute(
                "bad",
                AgentData::new().with("input", "x"),
                &ToolContext::new(),
            )
            .await;
        assert!(!result.success);
        assert!(result.error.contains("Tool execution error"));
    }
}
