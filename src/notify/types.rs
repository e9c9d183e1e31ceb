//! Event types for agent lifecycle notifications.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Kind of lifecycle event sent to the user's session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// An agent picked up the thread.
    AgentStarted,

    /// Streaming thinking/progress update.
    AgentThinking,

    /// A tool invocation began.
    ToolExecuting,

    /// A tool invocation finished.
    ToolCompleted,

    /// The agent finished the thread.
    AgentCompleted,

    /// Generic out-of-band update (backlog notices and the like).
    AgentUpdate,
}

impl EventKind {
    /// Whether events of this kind must be surfaced via an emergency log
    /// entry when they cannot be delivered.
    pub fn default_critical(self) -> bool {
        match self {
            EventKind::AgentStarted
            | EventKind::ToolExecuting
            | EventKind::ToolCompleted
            | EventKind::AgentCompleted => true,
            EventKind::AgentThinking | EventKind::AgentUpdate => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::AgentStarted => "agent_started",
            EventKind::AgentThinking => "agent_thinking",
            EventKind::ToolExecuting => "tool_executing",
            EventKind::ToolCompleted => "tool_completed",
            EventKind::AgentCompleted => "agent_completed",
            EventKind::AgentUpdate => "agent_update",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Routing keys identifying where a run's events go.
///
/// One context per agent run; every emit entry point takes it by reference.
#[derive(Debug, Clone)]
pub struct EventContext {
    pub user_id: String,
    pub thread_id: String,
    pub run_id: String,
    pub agent_name: String,
}

impl EventContext {
    /// Create a context with a fresh run ID.
    pub fn new(
        user_id: impl Into<String>,
        thread_id: impl Into<String>,
        agent_name: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            thread_id: thread_id.into(),
            run_id: Uuid::new_v4().to_string(),
            agent_name: agent_name.into(),
        }
    }

    /// Use a caller-supplied run ID instead of the generated one.
    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = run_id.into();
        self
    }
}

/// One unit of notification work.
///
/// The payload is opaque to the delivery core; it is passed through to the
/// sink untouched.
#[derive(Debug, Clone)]
pub struct Event {
    /// Unique within the owning notifier, monotonic in submission order.
    pub id: u64,
    pub kind: EventKind,
    pub thread_id: String,
    pub user_id: String,
    pub run_id: String,
    pub payload: Value,
    pub critical: bool,
    pub created_at: DateTime<Utc>,
    /// Delivery attempts performed so far. Never exceeds `max_attempts`.
    pub attempt_count: u32,
    pub max_attempts: u32,
    /// Earliest time the retry worker may attempt this event again.
    pub next_attempt_at: DateTime<Utc>,
}

impl Event {
    pub fn wire_message(&self) -> WireMessage {
        WireMessage {
            kind: self.kind,
            payload: self.payload.clone(),
        }
    }
}

/// Message shape handed to the sink: `{"type": ..., "payload": {...}}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireMessage {
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub payload: Value,
}

/// Point-in-time sizes of the delivery structures.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DeliveryStats {
    pub queued_events: usize,
    pub active_operations: usize,
    pub delivery_confirmations: usize,
    pub backlog_notifications_sent: u64,
}
