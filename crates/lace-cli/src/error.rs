//! `lace-cli`'s own error type (§7 error taxonomy, CLI exit codes per §6).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    /// §6 exit code 1: missing API key, unknown provider, or any other
    /// misconfiguration detected before an agent is started.
    #[error("{0}")]
    Configuration(String),

    #[error(transparent)]
    Agent(#[from] lace_agent::AgentError),

    #[error(transparent)]
    Thread(#[from] lace_core::LaceError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CliError {
    /// §6: "0 success, 1 configuration error ..., non-zero on uncaught
    /// errors". Configuration errors get the specified code 1; anything
    /// else gets a distinct non-zero code so the two classes are
    /// distinguishable from a shell.
    pub fn exit_code(&self) -> u8 {
        match self {
            CliError::Configuration(_) => 1,
            _ => 2,
        }
    }
}
