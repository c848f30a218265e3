use thiserror::Error;

/// One flat, non-exhaustive error enum for the tool boundary (§7).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ToolError {
    #[error("tool not found: {0}")]
    NotFound(String),

    #[error("validation error at {path}: {message}")]
    Validation { path: String, message: String },

    #[error("file not found: {0}")]
    FileNotFound(String),

    #[error("requested range is too large (max {max} lines)")]
    RangeTooLarge { max: usize },

    #[error("start line {start} exceeds file length {length}")]
    StartLineExceedsLength { start: usize, length: usize },

    #[error("end line {end} is before start line {start}")]
    EndBeforeStart { start: usize, end: usize },

    #[error("parent directory missing for {path}; pass create_dirs=true or create it first")]
    ParentMissing { path: String },

    #[error("cancelled")]
    Cancelled,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}
