//! Crate-wide error type for the thread/event core.

use thiserror::Error;

use crate::event::ThreadId;

/// Structured, non-exhaustive error type for `lace-core`.
///
/// Mirrors the one-flat-enum-per-crate-boundary convention: every failure
/// mode the store or projector can produce gets its own variant rather than
/// a wrapped `anyhow::Error`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum LaceError {
    #[error("thread already exists: {0}")]
    DuplicateThread(ThreadId),

    #[error("thread not found: {0}")]
    ThreadNotFound(ThreadId),

    #[error("unknown event type encountered during projection: {0}")]
    UnknownEventType(String),

    #[error("event payload failed to (de)serialize: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("persistence backend unavailable: {0}")]
    PersistenceUnavailable(String),

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type LaceResult<T> = Result<T, LaceError>;
