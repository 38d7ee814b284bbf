// Troupe Core - Operation events

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::data::AgentData;

/// What happened to an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    OperationStarted,
    OperationCompleted,
    OperationFailed,
    OperationCancelled,
    SystemStatusChanged,
}

/// Broadcast to every subscriber; the last 100 are retained for late joiners
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub kind: EventKind,

    #[serde(default)]
    pub operation_id: String,

    #[serde(default)]
    pub payload: AgentData,

    pub timestamp: DateTime<Utc>,
}

impl Event {
    pub fn new(kind: EventKind, operation_id: impl Into<String>) -> Self {
        Self {
            kind,
            operation_id: operation_id.into(),
            payload: AgentData::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn with_payload(mut self, payload: AgentData) -> Self {
        self.payload = payload;
        self
    }

    /// Whether this is the terminal event of an operation
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.kind,
            EventKind::OperationCompleted
                | EventKind::OperationFailed
                | EventKind::OperationCancelled
        )
    }
}
