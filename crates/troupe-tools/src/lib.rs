// Troupe Tools - Shared tool catalog
//
// Tools are reusable callables hosted in a global registry and shared
// across agents, unlike agent-bound functions. Each tool carries a schema,
// a category, tags, and an estimated cost; discovery filters on all four.

pub mod context;
pub mod registry;
pub mod tools;

pub use context::ToolContext;
pub use registry::{Tool, ToolFilter, ToolRegistry, ToolSchema};
