//! `EventTimeline` (§4.C): a pure projection from an event stream to a
//! sequence of UI timeline items. Never mutates, never fetches — delegate
//! events are supplied explicitly by the caller (§4.C, §8 invariant 6).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{LaceError, LaceResult};
use crate::event::{ContentBlock, Event, EventKind, ThreadId, ToolResultStatus};

/// A single projected timeline entry. Closed, tagged-variant set rather
/// than a class hierarchy (§9 design notes).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TimelineItem {
    UserMessage { text: String },
    AgentMessage { text: String },
    ToolExecution {
        call_id: String,
        name: String,
        arguments: serde_json::Value,
        result: Option<ToolExecutionResult>,
    },
    SystemMessage { text: String },
    /// A nested timeline for a delegate thread, keyed by the delegate
    /// thread id that opened it. Populated only when the caller passes the
    /// delegate's events alongside the parent's.
    DelegateTimeline {
        thread_id: ThreadId,
        items: Vec<TimelineItem>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolExecutionResult {
    pub status: ToolResultStatus,
    pub content: Vec<ContentBlock>,
}

/// Projects a flat, chronologically-ordered event stream into timeline
/// items. Incrementally appendable: `EventTimeline::new()` plus repeated
/// `append` is equivalent to one `from_events` call over the concatenation
/// (§8 invariant 5).
#[derive(Default)]
pub struct EventTimeline {
    items: Vec<TimelineItem>,
    /// Index from tool-call id to its slot in `items`, so a later
    /// `TOOL_RESULT` can attach in O(1).
    open_calls: HashMap<String, usize>,
}

impl EventTimeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_events(events: &[Event]) -> LaceResult<Self> {
        let mut timeline = Self::new();
        timeline.append_all(events)?;
        Ok(timeline)
    }

    pub fn items(&self) -> &[TimelineItem] {
        &self.items
    }

    pub fn into_items(self) -> Vec<TimelineItem> {
        self.items
    }

    pub fn append_all(&mut self, events: &[Event]) -> LaceResult<()> {
        for event in events {
            self.append(event)?;
        }
        Ok(())
    }

    /// O(1) amortized per event.
    pub fn append(&mut self, event: &Event) -> LaceResult<()> {
        match &event.kind {
            EventKind::UserMessage(text) => {
                self.items.push(TimelineItem::UserMessage { text: text.clone() });
            }
            EventKind::AgentMessage(text) => {
                self.items.push(TimelineItem::AgentMessage { text: text.clone() });
            }
            EventKind::ToolCall(call) => {
                self.open_calls.insert(call.id.clone(), self.items.len());
                self.items.push(TimelineItem::ToolExecution {
                    call_id: call.id.clone(),
                    name: call.name.clone(),
                    arguments: call.arguments.clone(),
                    result: None,
                });
            }
            EventKind::ToolResult(result) => {
                if let Some(&idx) = self.open_calls.get(&result.id) {
                    if let TimelineItem::ToolExecution { result: slot, .. } = &mut self.items[idx] {
                        *slot = Some(ToolExecutionResult {
                            status: result.status,
                            content: result.content.clone(),
                        });
                    }
                }
                // A TOOL_RESULT with no matching open call is tolerated:
                // invariant 2 is enforced at the store/agent layer, not here.
            }
            EventKind::LocalSystemMessage(text) => {
                self.items.push(TimelineItem::SystemMessage { text: text.clone() });
            }
            EventKind::SystemPrompt(_)
            | EventKind::UserSystemPrompt(_)
            | EventKind::ToolApprovalRequest(_)
            | EventKind::ToolApprovalResponse(_)
            | EventKind::Compaction(_) => {
                // Administrative events carry no timeline representation.
            }
        }
        Ok(())
    }

    /// Attaches a fully-projected delegate timeline (built separately from
    /// that thread's own events) under its thread id. Callers decide when
    /// to fetch and project delegate events; this projector never does it
    /// implicitly.
    pub fn attach_delegate(&mut self, thread_id: ThreadId, delegate_items: Vec<TimelineItem>) {
        self.items.push(TimelineItem::DelegateTimeline {
            thread_id,
            items: delegate_items,
        });
    }
}

/// Fails fast on an event of an unrecognized type, per §7's
/// "Unknown EventType" error kind. `EventKind` is a closed serde enum, so an
/// unrecognized `type` tag fails at deserialization; this helper re-surfaces
/// that as a typed projector error for callers reading raw JSON.
pub fn project_raw(raw_events: &[serde_json::Value]) -> LaceResult<EventTimeline> {
    let mut events = Vec::with_capacity(raw_events.len());
    for raw in raw_events {
        let event: Event = serde_json::from_value(raw.clone()).map_err(|e| {
            LaceError::UnknownEventType(format!("{e} (raw: {raw})"))
        })?;
        events.push(event);
    }
    EventTimeline::from_events(&events)
}
