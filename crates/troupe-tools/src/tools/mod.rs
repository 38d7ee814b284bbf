// Troupe Tools - Built-in tools

mod http_fetch;
mod text_stats;
mod timestamp;

pub use http_fetch::HttpFetchTool;
pub use text_stats::TextStatsTool;
pub use timestamp::TimestampTool;

use std::sync::Arc;

use crate::registry::Tool;

/// The default tool set registered by `ToolRegistry::with_builtins`
pub fn builtin_tools() -> Vec<Arc<dyn Tool>> {
    vec![
        Arc::new(TextStatsTool::new()),
        Arc::new(TimestampTool::new()),
        Arc::new(HttpFetchTool::new()),
    ]
}
