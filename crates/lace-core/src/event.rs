//! The closed set of event types that make up a thread, and the thread
//! identifier scheme (§3 of the design: canonical ids, delegate suffixes).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifies a thread: either a root thread (`lace_YYYYMMDD_xxxxxx`) or a
/// delegate thread, which extends a parent id with one or more `.N` suffixes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ThreadId(String);

impl ThreadId {
    /// Builds a root thread id from an 8-digit date and a six-character
    /// lowercase base36 suffix. Does not validate uniqueness; that is the
    /// `ThreadManager`'s job.
    pub fn new_root(date_yyyymmdd: &str, suffix: &str) -> Self {
        Self(format!("lace_{date_yyyymmdd}_{suffix}"))
    }

    /// Wraps an already-formed id string without validation. Used when
    /// reading ids back out of storage.
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The root id this thread descends from (itself, if it is already a
    /// root thread).
    pub fn root(&self) -> ThreadId {
        match self.0.split_once('.') {
            Some((root, _)) => ThreadId(root.to_string()),
            None => self.clone(),
        }
    }

    /// True if `self` is `other` or a delegate descendant of `other`
    /// (`other` followed by one or more `.N` segments).
    pub fn is_descendant_of(&self, other: &ThreadId) -> bool {
        if self.0 == other.0 {
            return true;
        }
        self.0
            .strip_prefix(other.0.as_str())
            .map(|rest| rest.starts_with('.'))
            .unwrap_or(false)
    }

    /// Builds the next delegate id under this thread, given the set of
    /// sibling suffixes already taken.
    pub fn next_delegate(&self, taken: &[u32]) -> ThreadId {
        let next = taken.iter().max().copied().unwrap_or(0) + 1;
        ThreadId(format!("{}.{}", self.0, next))
    }

    pub fn is_root(&self) -> bool {
        !self.0.contains('.')
    }
}

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ThreadId {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(ThreadId(s.to_string()))
    }
}

/// Validates that a string has the canonical root-thread shape
/// (`lace_YYYYMMDD_` followed by six lowercase base36 characters), ignoring
/// any trailing delegate suffixes.
pub fn looks_like_thread_id(raw: &str) -> bool {
    let root = raw.split('.').next().unwrap_or(raw);
    let Some(rest) = root.strip_prefix("lace_") else {
        return false;
    };
    let Some((date, suffix)) = rest.split_once('_') else {
        return false;
    };
    date.len() == 8
        && date.bytes().all(|b| b.is_ascii_digit())
        && suffix.len() == 6
        && suffix
            .bytes()
            .all(|b| b.is_ascii_digit() || b.is_ascii_lowercase())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(pub Uuid);

impl EventId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// A single typed block inside a `TOOL_RESULT`'s content list. `Text` is the
/// only variant tool implementations emit today; the set is left
/// `non_exhaustive` so future block kinds (images, diffs, ...) can be added
/// without breaking the wire shape of existing ones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
#[non_exhaustive]
pub enum ContentBlock {
    Text { text: String },
}

impl ContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        ContentBlock::Text { text: text.into() }
    }

    pub fn as_text(&self) -> &str {
        match self {
            ContentBlock::Text { text } => text,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolResultStatus {
    Completed,
    Failed,
    Denied,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalDecision {
    AllowOnce,
    AllowSession,
    Deny,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallData {
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResultData {
    pub id: String,
    pub content: Vec<ContentBlock>,
    pub status: ToolResultStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolApprovalRequestData {
    pub tool_call_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolApprovalResponseData {
    pub tool_call_id: String,
    pub decision: ApprovalDecision,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompactionData {
    pub strategy_id: String,
    pub original_event_count: usize,
    pub compacted_event_count: usize,
}

/// The closed set of event types a thread may contain (§3). Serialized with
/// an internally-tagged `type`/`data` split so the on-disk shape matches the
/// persisted-state layout described in the external interfaces section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum EventKind {
    #[serde(rename = "USER_MESSAGE")]
    UserMessage(String),
    #[serde(rename = "AGENT_MESSAGE")]
    AgentMessage(String),
    #[serde(rename = "TOOL_CALL")]
    ToolCall(ToolCallData),
    #[serde(rename = "TOOL_RESULT")]
    ToolResult(ToolResultData),
    #[serde(rename = "TOOL_APPROVAL_REQUEST")]
    ToolApprovalRequest(ToolApprovalRequestData),
    #[serde(rename = "TOOL_APPROVAL_RESPONSE")]
    ToolApprovalResponse(ToolApprovalResponseData),
    #[serde(rename = "SYSTEM_PROMPT")]
    SystemPrompt(String),
    #[serde(rename = "USER_SYSTEM_PROMPT")]
    UserSystemPrompt(String),
    #[serde(rename = "LOCAL_SYSTEM_MESSAGE")]
    LocalSystemMessage(String),
    #[serde(rename = "COMPACTION")]
    Compaction(CompactionData),
}

impl EventKind {
    /// The stable string tag used for the `type` column / field.
    pub fn type_name(&self) -> &'static str {
        match self {
            EventKind::UserMessage(_) => "USER_MESSAGE",
            EventKind::AgentMessage(_) => "AGENT_MESSAGE",
            EventKind::ToolCall(_) => "TOOL_CALL",
            EventKind::ToolResult(_) => "TOOL_RESULT",
            EventKind::ToolApprovalRequest(_) => "TOOL_APPROVAL_REQUEST",
            EventKind::ToolApprovalResponse(_) => "TOOL_APPROVAL_RESPONSE",
            EventKind::SystemPrompt(_) => "SYSTEM_PROMPT",
            EventKind::UserSystemPrompt(_) => "USER_SYSTEM_PROMPT",
            EventKind::LocalSystemMessage(_) => "LOCAL_SYSTEM_MESSAGE",
            EventKind::Compaction(_) => "COMPACTION",
        }
    }

    /// Administrative events never sent to the model (agent turn-building
    /// step 2 drops these).
    pub fn is_model_invisible(&self) -> bool {
        matches!(
            self,
            EventKind::SystemPrompt(_)
                | EventKind::UserSystemPrompt(_)
                | EventKind::LocalSystemMessage(_)
                | EventKind::ToolApprovalRequest(_)
                | EventKind::ToolApprovalResponse(_)
                | EventKind::Compaction(_)
        )
    }
}

/// A persisted event: `{ id, threadId, type, timestamp, data }` (§3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub thread_id: ThreadId,
    /// Logical, monotone-per-thread clock (not wall time); invariant 4.
    pub timestamp: u64,
    #[serde(flatten)]
    pub kind: EventKind,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thread_id_root_shape_validates() {
        assert!(looks_like_thread_id("lace_20250101_abc123"));
        assert!(looks_like_thread_id("lace_20250101_abc123.1.2"));
        assert!(!looks_like_thread_id("not-a-thread"));
        assert!(!looks_like_thread_id("lace_2025_abc123"));
        assert!(!looks_like_thread_id("lace_20250101_ABC123"));
    }

    #[test]
    fn delegate_descendant() {
        let parent = ThreadId::from_raw("lace_20250101_abc123");
        let child = ThreadId::from_raw("lace_20250101_abc123.1");
        let grandchild = ThreadId::from_raw("lace_20250101_abc123.1.1");
        let unrelated = ThreadId::from_raw("lace_20250101_zzz999");
        assert!(child.is_descendant_of(&parent));
        assert!(grandchild.is_descendant_of(&parent));
        assert!(parent.is_descendant_of(&parent));
        assert!(!unrelated.is_descendant_of(&parent));
        // prefix-but-not-dotted siblings must not match
        let sibling_confusable = ThreadId::from_raw("lace_20250101_abc1234");
        assert!(!sibling_confusable.is_descendant_of(&parent));
    }

    #[test]
    fn next_delegate_picks_first_free_slot() {
        let parent = ThreadId::from_raw("lace_20250101_abc123");
        assert_eq!(parent.next_delegate(&[]).as_str(), "lace_20250101_abc123.1");
        assert_eq!(
            parent.next_delegate(&[1, 2]).as_str(),
            "lace_20250101_abc123.3"
        );
    }

    #[test]
    fn event_kind_json_round_trip() {
        let kind = EventKind::ToolCall(ToolCallData {
            id: "call-1".into(),
            name: "bash".into(),
            arguments: serde_json::json!({"command": "ls"}),
        });
        let json = serde_json::to_string(&kind).unwrap();
        assert!(json.contains("\"type\":\"TOOL_CALL\""));
        let restored: EventKind = serde_json::from_str(&json).unwrap();
        assert_eq!(kind, restored);
    }

    #[test]
    fn administrative_events_are_model_invisible() {
        assert!(EventKind::SystemPrompt("x".into()).is_model_invisible());
        assert!(!EventKind::UserMessage("x".into()).is_model_invisible());
    }
}
