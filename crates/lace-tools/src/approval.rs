//! Approval gate (§4.E): suspends a pending tool call instead of blocking,
//! by raising a durable `TOOL_APPROVAL_REQUEST` event and waiting for a
//! matching `TOOL_APPROVAL_RESPONSE` to land on the same thread.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use lace_core::{ApprovalDecision, Event, EventKind, LaceError, LaceResult, ThreadId, ThreadStore};
use parking_lot::Mutex;
use tokio::time::sleep;

/// A decision already on file for a tool name, persisted for the lifetime
/// of a session ("allow for this session" in step 3 of §4.E).
#[derive(Default)]
struct SessionAllowlist {
    names: HashSet<String>,
}

/// What a caller does with a pending approval, raised to the agent loop as
/// `LaceError::ApprovalPending` rather than awaited in-process, so a turn
/// can suspend without holding a task open indefinitely.
pub struct ApprovalGate {
    store: Arc<dyn ThreadStore>,
    allowlist: Mutex<SessionAllowlist>,
    poll_interval: Duration,
}

impl ApprovalGate {
    pub fn new(store: Arc<dyn ThreadStore>) -> Self {
        Self {
            store,
            allowlist: Mutex::new(SessionAllowlist::default()),
            poll_interval: Duration::from_millis(50),
        }
    }

    /// Step 1: tools whose `destructive_hint` is `Some(false)` or
    /// `read_only_hint` is `Some(true)` never require approval.
    pub fn requires_approval(destructive_hint: Option<bool>, read_only_hint: Option<bool>) -> bool {
        if read_only_hint == Some(true) {
            return false;
        }
        !matches!(destructive_hint, Some(false))
    }

    /// Step 3: a prior "allow for session" decision for this tool name
    /// short-circuits the gate without touching the thread at all.
    pub fn session_allowed(&self, tool_name: &str) -> bool {
        self.allowlist.lock().names.contains(tool_name)
    }

    /// Pre-populates the session allowlist for `tool_name`, as if an
    /// `allow_session` decision had already landed. Used by callers that
    /// apply a standing policy (e.g. a CLI's `--auto-approve-tools` flag)
    /// instead of waiting for a per-call decision.
    pub fn pre_approve(&self, tool_name: impl Into<String>) {
        self.remember_session_allow(&tool_name.into());
    }

    fn remember_session_allow(&self, tool_name: &str) {
        self.allowlist.lock().names.insert(tool_name.to_string());
    }

    /// Step 2 recovery case: a decision may already be on the thread for
    /// `tool_call_id` (a replay, or a response that raced the request).
    pub async fn existing_decision(
        &self,
        thread_id: &ThreadId,
        tool_call_id: &str,
    ) -> LaceResult<Option<ApprovalDecision>> {
        let events = self.store.get_events(thread_id).await?;
        Ok(find_response(&events, tool_call_id))
    }

    /// Step 3: raises a `TOOL_APPROVAL_REQUEST` event for `tool_call_id` on
    /// `thread_id`, unless one is already on file (idempotent on retry).
    /// Returns the event so the caller can surface it and return control to
    /// the user instead of blocking.
    pub async fn request(&self, thread_id: &ThreadId, tool_call_id: &str) -> LaceResult<Option<Event>> {
        let events = self.store.get_events(thread_id).await?;
        let already_requested = events.iter().any(|event| {
            matches!(&event.kind, EventKind::ToolApprovalRequest(data) if data.tool_call_id == tool_call_id)
        });
        if already_requested {
            return Ok(None);
        }
        let event = self
            .store
            .append_event(
                thread_id,
                EventKind::ToolApprovalRequest(lace_core::ToolApprovalRequestData {
                    tool_call_id: tool_call_id.to_string(),
                }),
            )
            .await?;
        Ok(Some(event))
    }

    /// Step 4: polls the thread for a `TOOL_APPROVAL_RESPONSE` matching
    /// `tool_call_id`, up to `timeout`. A response bearing `AllowSession` is
    /// recorded in the in-process allowlist for the tool name before
    /// returning, so later calls to the same tool skip the gate entirely.
    ///
    /// Polling rather than a notify channel mirrors the teacher's
    /// `SessionStore` access pattern: the store is the only source of
    /// truth, and a second process could in principle write the response.
    pub async fn await_decision(
        &self,
        thread_id: &ThreadId,
        tool_call_id: &str,
        tool_name: &str,
        timeout: Duration,
    ) -> LaceResult<ApprovalDecision> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let events = self.store.get_events(thread_id).await?;
            if let Some(decision) = find_response(&events, tool_call_id) {
                if matches!(decision, ApprovalDecision::AllowSession) {
                    self.remember_session_allow(tool_name);
                }
                return Ok(decision);
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(LaceError::Internal(format!(
                    "approval for tool call {tool_call_id} timed out"
                )));
            }
            sleep(self.poll_interval).await;
        }
    }
}

fn find_response(events: &[Event], tool_call_id: &str) -> Option<ApprovalDecision> {
    events.iter().rev().find_map(|event| match &event.kind {
        EventKind::ToolApprovalResponse(data) if data.tool_call_id == tool_call_id => {
            Some(data.decision)
        }
        _ => None,
    })
}
