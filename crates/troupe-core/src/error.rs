// Troupe Core - Error types
//
// One error enum for the whole runtime. Failures that reach a function or
// workflow boundary are converted into FunctionResult values there; this
// type never crosses a worker loop or an HTTP handler uncaught.

use thiserror::Error;

/// Result alias used across the workspace
pub type TroupeResult<T> = Result<T, TroupeError>;

/// Runtime error taxonomy
#[derive(Debug, Error)]
pub enum TroupeError {
    /// Missing or wrongly-typed parameters, malformed bodies
    #[error("validation error: {0}")]
    Validation(String),

    /// Unknown agent/function/workflow/execution id
    #[error("not found: {0}")]
    NotFound(String),

    /// Duplicate names/ids, queue at capacity
    #[error("conflict: {0}")]
    Conflict(String),

    /// Network failure, timeout, 5xx from the inference service
    #[error("transport error: {0}")]
    Transport(String),

    /// 401/403 from the inference service
    #[error("authentication error: {0}")]
    Auth(String),

    /// 429 from the inference service
    #[error("quota exceeded: {0}")]
    Quota(String),

    /// Inference service rejected the request or answered unusably
    #[error("inference error: {0}")]
    Inference(String),

    /// Agent lifecycle or dispatch failure
    #[error("agent error: {0}")]
    Agent(String),

    /// Tool registration or execution failure
    #[error("tool error: {0}")]
    Tool(String),

    /// Workflow definition or execution failure
    #[error("workflow error: {0}")]
    Workflow(String),

    /// Planning layer failure
    #[error("planning error: {0}")]
    Planning(String),

    /// Operation cancelled before it ran
    #[error("operation cancelled")]
    Cancelled,

    /// Wall-clock budget exceeded
    #[error("timeout")]
    Timeout,

    /// Configuration problem at startup or reload
    #[error("configuration error: {0}")]
    Config(String),

    /// Uncaught failure inside user code
    #[error("internal error: {0}")]
    Internal(String),

    /// Serialization round-trip failure
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl TroupeError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    pub fn inference(msg: impl Into<String>) -> Self {
        Self::Inference(msg.into())
    }

    pub fn agent(msg: impl Into<String>) -> Self {
        Self::Agent(msg.into())
    }

    pub fn tool(msg: impl Into<String>) -> Self {
        Self::Tool(msg.into())
    }

    pub fn workflow(msg: impl Into<String>) -> Self {
        Self::Workflow(msg.into())
    }

    pub fn planning(msg: impl Into<String>) -> Self {
        Self::Planning(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether a transport-level retry may help
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Quota(_) => true,
            Self::Transport(msg) => {
                let msg = msg.to_ascii_lowercase();
                msg.contains("timeout") || msg.contains("connection")
            }
            _ => false,
        }
    }

    /// Stable machine-readable tag used in error payloads
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::NotFound(_) => "not_found",
            Self::Conflict(_) => "conflict",
            Self::Transport(_) => "transport_error",
            Self::Auth(_) => "auth_error",
            Self::Quota(_) => "quota_error",
            Self::Inference(_) => "service_error",
            Self::Agent(_) => "agent_error",
            Self::Tool(_) => "tool_error",
            Self::Workflow(_) => "workflow_error",
            Self::Planning(_) => "planning_error",
            Self::Cancelled => "cancelled",
            Self::Timeout => "request_timeout",
            Self::Config(_) => "config_error",
            Self::Internal(_) => "internal_error",
            Self::Serialization(_) => "serialization_error",
        }
    }
}
