//! Event-sourced thread/conversation core: the append-only log, its
//! projector, and compaction. See `ThreadStore`, `ThreadManager`,
//! `EventTimeline`, and `Compactor`.

pub mod compaction;
pub mod error;
pub mod event;
pub mod store;
pub mod thread;
pub mod thread_manager;
pub mod thread_store;
pub mod timeline;

pub use compaction::{CompactStrategy, Compactor, DropOldTurnsStrategy, SummarizeStrategy, Summarizer};
pub use error::{LaceError, LaceResult};
pub use event::{
    ApprovalDecision, CompactionData, ContentBlock, Event, EventId, EventKind, ThreadId,
    ToolApprovalRequestData, ToolApprovalResponseData, ToolCallData, ToolResultData,
    ToolResultStatus,
};
pub use thread::Thread;
pub use thread_manager::{ResumeOutcome, ThreadManager};
pub use thread_store::ThreadStore;
pub use timeline::{EventTimeline, TimelineItem, ToolExecutionResult};
