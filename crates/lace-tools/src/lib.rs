//! Tool registry, schema-validated execution, approval gating, and the
//! built-in tool set (`bash`, `file_read`, `file_write`). `delegate` is
//! implemented one layer up, in `lace-agent`, since it needs to spawn a
//! child agent; it registers into the `ToolRegistry` defined here.

pub mod approval;
pub mod builtins;
pub mod context;
pub mod error;
pub mod executor;
pub mod registry;

pub use approval::ApprovalGate;
pub use builtins::{BashTool, FileReadTool, FileWriteTool};
pub use context::{Tool, ToolAnnotations, ToolContext};
pub use error::ToolError;
pub use executor::{ExecutionOutcome, ToolExecutor};
pub use registry::ToolRegistry;

/// A registry pre-loaded with the three tools every agent gets by default.
/// `delegate` is added separately by `lace-agent`.
pub fn default_registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry
        .register(std::sync::Arc::new(BashTool))
        .register(std::sync::Arc::new(FileReadTool))
        .register(std::sync::Arc::new(FileWriteTool));
    registry
}
