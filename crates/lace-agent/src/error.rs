use thiserror::Error;

/// One flat, non-exhaustive error enum for the agent/session boundary,
/// following the teacher's convention of one enum per crate rather than
/// nested error trees.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AgentError {
    #[error("agent not started; call start() before sendMessage()")]
    NotStarted,

    #[error("agent not found: {0}")]
    AgentNotFound(String),

    #[error("invalid delegate model spec: {0}")]
    InvalidModel(String),

    #[error("delegate call timed out after {0:?}")]
    DelegateTimeout(std::time::Duration),

    #[error("token budget exceeded")]
    BudgetExceeded,

    #[error(transparent)]
    Thread(#[from] lace_core::LaceError),

    #[error(transparent)]
    Tool(#[from] lace_tools::ToolError),

    #[error(transparent)]
    Provider(#[from] lace_provider::ProviderError),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type AgentResult<T> = Result<T, AgentError>;
