//! The `Tool` capability trait and its execution context (§4.D).

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use lace_core::ContentBlock;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::ToolError;

/// Advisory hints a tool definition carries for clients deciding how to
/// surface or gate a call (§4.D). All optional; absence means "unknown",
/// not "false".
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolAnnotations {
    pub title: Option<String>,
    pub destructive_hint: Option<bool>,
    pub read_only_hint: Option<bool>,
    pub idempotent_hint: Option<bool>,
    pub open_world_hint: Option<bool>,
}

impl ToolAnnotations {
    pub fn builder() -> Self {
        Self::default()
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn destructive(mut self, value: bool) -> Self {
        self.destructive_hint = Some(value);
        self
    }

    pub fn read_only(mut self, value: bool) -> Self {
        self.read_only_hint = Some(value);
        self
    }

    pub fn idempotent(mut self, value: bool) -> Self {
        self.idempotent_hint = Some(value);
        self
    }

    pub fn open_world(mut self, value: bool) -> Self {
        self.open_world_hint = Some(value);
        self
    }
}

/// Per-call execution context: cancellation, temp dir, and working
/// directory. Injected by the `ToolExecutor` (temp dir is allocated lazily,
/// per call id, step 4 of §4.D).
pub struct ToolContext {
    pub working_directory: Option<PathBuf>,
    pub temp_dir: PathBuf,
    pub cancel: CancellationToken,
}

impl ToolContext {
    /// Resolves `path` against `working_directory` if relative, otherwise
    /// against the process directory, per the `file_read`/`file_write`
    /// contract in §4.D.
    pub fn resolve_path(&self, path: &str) -> PathBuf {
        let p = Path::new(path);
        if p.is_absolute() {
            return p.to_path_buf();
        }
        match &self.working_directory {
            Some(cwd) => cwd.join(p),
            None => p.to_path_buf(),
        }
    }
}

/// `{ name, description, inputSchema, annotations, executeValidated }`
/// (§4.D). Dispatch is by registry lookup, not inheritance (§9).
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn input_schema(&self) -> serde_json::Value;

    fn annotations(&self) -> ToolAnnotations {
        ToolAnnotations::default()
    }

    /// Called only after the executor has validated `args` against
    /// `input_schema` and approval has been granted. Returning `Err`
    /// produces a `failed` `ToolResult`; returning `Ok` always produces a
    /// `completed` one, even if the content describes an in-band failure
    /// (e.g. a non-zero shell exit code — see `bash`).
    async fn execute_validated(
        &self,
        args: serde_json::Value,
        ctx: &ToolContext,
    ) -> Result<Vec<ContentBlock>, ToolError>;
}
