//! `EngineConfig`: the per-Agent tunables the spec's §1.1 ambient-stack
//! expansion calls for (token budget, retry caps, temp-dir root), plus the
//! defaults `DelegateCoordinator` falls back to when a delegate call
//! doesn't override them.

use std::path::PathBuf;
use std::time::Duration;

use lace_provider::{RetryConfig, TokenBudgetConfig};

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub retry: RetryConfig,
    pub token_budget: Option<TokenBudgetConfig>,
    /// Root directory under which `ToolExecutor` allocates per-call temp
    /// dirs; `Session::get_session_temp_dir` nests under this.
    pub temp_dir_root: PathBuf,
    pub stream_responses: bool,
    pub approval_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            token_budget: None,
            temp_dir_root: std::env::temp_dir().join("lace"),
            stream_responses: true,
            approval_timeout: Duration::from_secs(300),
        }
    }
}

/// Default delegate call timeout (§4.J step 4, §9 open question: fixed at
/// 60s, overridable per call via `DelegateCoordinator::with_timeout`).
pub fn default_delegate_timeout() -> Duration {
    Duration::from_secs(60)
}
