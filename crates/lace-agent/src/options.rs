//! `RunnerOptions` (§6): the parsed form of the CLI surface the core
//! actually consumes. Parsing `std::env::args()` into this struct is
//! `lace-cli`'s job, not the engine's -- this type exists so that
//! boundary is a typed `From`/builder call rather than a loose bag of
//! strings threaded through by hand.

use std::path::PathBuf;

/// One resolved `--provider`/`--model` pair, or a `provider:model` override
/// string split apart (the same syntax `DelegateCoordinator` accepts for
/// its `model` argument).
#[derive(Debug, Clone, Default)]
pub struct RunnerOptions {
    pub provider: Option<String>,
    pub model: Option<String>,
    pub prompt: Option<String>,
    /// `--continue [threadId]`: `Some(None)` means "resume the most recent
    /// thread"; `Some(Some(id))` resumes a specific one; `None` means a
    /// fresh thread.
    pub continue_thread: Option<Option<String>>,
    pub log_level: Option<String>,
    pub log_file: Option<PathBuf>,
    pub har_file: Option<PathBuf>,
    pub allow_non_destructive_tools: bool,
    pub auto_approve_tools: bool,
    pub disable_tools: Vec<String>,
    pub disable_all_tools: bool,
    pub disable_tool_guardrails: bool,
    pub list_tools: bool,
}

impl RunnerOptions {
    pub fn new() -> Self {
        Self::default()
    }
}
