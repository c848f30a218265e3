//! The `ThreadStore` trait (§4.A): durable, append-only event log keyed by
//! thread id, plus the two backends that implement it.

use async_trait::async_trait;

use crate::error::LaceResult;
use crate::event::{Event, EventKind, ThreadId};
use crate::thread::Thread;

/// A durable key-value log keyed by `ThreadId`. Both backends (in-memory,
/// sqlite) implement this trait so callers are backend-agnostic, mirroring
/// the teacher's `SessionStore` split between `in_memory.rs` and
/// `sqlite.rs`.
#[async_trait]
pub trait ThreadStore: Send + Sync {
    /// Fails with `LaceError::DuplicateThread` if `id` already exists.
    async fn create_thread(&self, id: &ThreadId) -> LaceResult<()>;

    /// Assigns a monotone-per-thread timestamp and a stable event id.
    async fn append_event(&self, thread_id: &ThreadId, kind: EventKind) -> LaceResult<Event>;

    /// Ordered ascending by timestamp then insertion order.
    async fn get_events(&self, thread_id: &ThreadId) -> LaceResult<Vec<Event>>;

    /// The union of events for `root_id` and every thread whose id has
    /// `root_id` as a strict dotted prefix, chronologically merged.
    async fn get_main_and_delegate_events(&self, root_id: &ThreadId) -> LaceResult<Vec<Event>>;

    /// The most recently written top-level (non-delegate) thread, if any.
    async fn get_latest_thread_id(&self) -> LaceResult<Option<ThreadId>>;

    async fn has_thread(&self, id: &ThreadId) -> LaceResult<bool>;

    async fn get_thread(&self, id: &ThreadId) -> LaceResult<Option<Thread>>;

    /// Follows compaction indirection to the current shadow thread.
    /// Returns `id` unchanged if it has never been superseded.
    async fn canonical_id(&self, id: &ThreadId) -> LaceResult<ThreadId>;

    /// Records that `canonical` now resolves to `shadow` (compaction
    /// indirection). Does not touch either thread's events.
    async fn rebind_canonical(&self, canonical: &ThreadId, shadow: &ThreadId) -> LaceResult<()>;

    /// All thread ids whose id is `parent` followed by exactly one more
    /// `.N` segment (i.e. direct delegate children, not grandchildren).
    /// Used by `ThreadManager` to pick the next free delegate suffix.
    async fn direct_children(&self, parent: &ThreadId) -> LaceResult<Vec<ThreadId>>;
}
