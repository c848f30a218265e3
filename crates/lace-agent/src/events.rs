//! The agent's event stream: everything a UI needs to render a turn in
//! progress, broadcast over a bounded channel so multiple observers (a
//! terminal renderer, a log sink, a test harness) can subscribe
//! independently. Grounded on the teacher's `EventBus` (`agent/src/event_bus.rs`),
//! trimmed to drop the pluggable-observer machinery this crate doesn't need.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::state::AgentState;

const EVENT_BUS_BUFFER: usize = 1024;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentEvent {
    pub seq: u64,
    pub timestamp: i64,
    pub thread_id: String,
    pub kind: AgentEventKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum AgentEventKind {
    StateChange { from: AgentState, to: AgentState },
    AgentThinkingStart,
    AgentThinkingComplete,
    AgentToken { token: String },
    AgentResponseComplete { content: String },
    ToolCallStarted { tool_call_id: String, name: String },
    ToolCallCompleted { tool_call_id: String },
    Error { error: String, phase: String },
    ConversationComplete,
    MessageQueued { queue_length: usize },
    QueueProcessingStart,
    QueueProcessingComplete,
    TokenBudgetWarning { used: u64, max: u64 },
    RetryStatus {
        is_retrying: bool,
        attempt: u32,
        max_attempts: u32,
        delay_ms: u64,
        error_type: String,
    },
}

/// A bounded broadcast bus: late subscribers miss earlier events but never
/// block a publisher, matching the teacher's choice of `broadcast` over an
/// mpsc fanout for UI-facing event streams.
pub struct EventBus {
    sender: broadcast::Sender<AgentEvent>,
    sequence: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_BUS_BUFFER);
        Self {
            sender,
            sequence: AtomicU64::new(1),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AgentEvent> {
        self.sender.subscribe()
    }

    pub fn publish(&self, thread_id: &str, kind: AgentEventKind) {
        let event = AgentEvent {
            seq: self.sequence.fetch_add(1, Ordering::Relaxed),
            timestamp: now_unix(),
            thread_id: thread_id.to_string(),
            kind,
        };
        let _ = self.sender.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

fn now_unix() -> i64 {
    time::OffsetDateTime::now_utc().unix_timestamp()
}
