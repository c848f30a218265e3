//! `ToolExecutor` (§4.D): the six-step dispatch pipeline from a raw
//! `TOOL_CALL` to a `ToolResult`.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use lace_core::{ContentBlock, LaceResult, ThreadId, ToolCallData, ToolResultData, ToolResultStatus};
use tokio_util::sync::CancellationToken;

use crate::approval::ApprovalGate;
use crate::context::{Tool, ToolContext};
use crate::error::ToolError;
use crate::registry::ToolRegistry;

/// What `ToolExecutor::execute` produced: a finished result, or a signal
/// that the call is waiting on a human decision. The agent loop must not
/// invoke the tool again for `Pending` — it re-enters execution once a
/// `TOOL_APPROVAL_RESPONSE` lands on the thread.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionOutcome {
    Result(ToolResultData),
    Pending,
}

pub struct ToolExecutor {
    registry: ToolRegistry,
    approval: Arc<ApprovalGate>,
    temp_root: PathBuf,
    approval_timeout: Duration,
}

impl ToolExecutor {
    pub fn new(registry: ToolRegistry, approval: Arc<ApprovalGate>, temp_root: PathBuf) -> Self {
        Self {
            registry,
            approval,
            temp_root,
            approval_timeout: Duration::from_secs(300),
        }
    }

    pub fn with_approval_timeout(mut self, timeout: Duration) -> Self {
        self.approval_timeout = timeout;
        self
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub async fn execute(
        &self,
        thread_id: &ThreadId,
        call: &ToolCallData,
        working_directory: Option<PathBuf>,
        cancel: CancellationToken,
    ) -> Result<ExecutionOutcome, ToolError> {
        // Step 1: lookup.
        let tool = self
            .registry
            .find(&call.name)
            .ok_or_else(|| ToolError::NotFound(call.name.clone()))?;

        // Step 2: schema validation.
        validate_against_schema(&call.arguments, &tool.input_schema())?;

        // Step 3: approval.
        let annotations = tool.annotations();
        if ApprovalGate::requires_approval(annotations.destructive_hint, annotations.read_only_hint)
            && !self.approval.session_allowed(&call.name)
        {
            if let Some(decision) = map_lace_err(self.approval.existing_decision(thread_id, &call.id).await)? {
                if matches!(decision, lace_core::ApprovalDecision::Deny) {
                    return Ok(ExecutionOutcome::Result(denied_result(&call.id)));
                }
            } else {
                map_lace_err(self.approval.request(thread_id, &call.id).await)?;
                return Ok(ExecutionOutcome::Pending);
            }
        }

        // Step 4: per-call temp directory.
        let call_temp_dir = self.temp_root.join(&call.id);
        tokio::fs::create_dir_all(&call_temp_dir)
            .await
            .map_err(ToolError::Io)?;

        let ctx = ToolContext {
            working_directory,
            temp_dir: call_temp_dir,
            cancel,
        };

        // Step 5: invoke.
        let result = tool.execute_validated(call.arguments.clone(), &ctx).await;

        // Step 6: construct the ToolResult. `Err` from the tool's own logic
        // maps to `failed`; `Ok` is always `completed`, even when the
        // content describes an in-band failure (e.g. bash's non-zero exit).
        match result {
            Ok(content) => Ok(ExecutionOutcome::Result(ToolResultData {
                id: call.id.clone(),
                content,
                status: ToolResultStatus::Completed,
            })),
            Err(err) => Ok(ExecutionOutcome::Result(ToolResultData {
                id: call.id.clone(),
                content: vec![ContentBlock::text(err.to_string())],
                status: ToolResultStatus::Failed,
            })),
        }
    }

    /// Called once a `TOOL_APPROVAL_RESPONSE` has landed, to resolve a call
    /// that previously returned `Pending`. Blocks (cooperatively, via
    /// `await_decision`'s poll) up to `approval_timeout`.
    pub async fn resume_pending(
        &self,
        thread_id: &ThreadId,
        call: &ToolCallData,
        working_directory: Option<PathBuf>,
        cancel: CancellationToken,
    ) -> Result<ExecutionOutcome, ToolError> {
        let decision = self
            .approval
            .await_decision(thread_id, &call.id, &call.name, self.approval_timeout)
            .await
            .map_err(|e| ToolError::Internal(e.to_string()))?;
        if matches!(decision, lace_core::ApprovalDecision::Deny) {
            return Ok(ExecutionOutcome::Result(denied_result(&call.id)));
        }
        self.execute(thread_id, call, working_directory, cancel).await
    }
}

fn denied_result(call_id: &str) -> ToolResultData {
    ToolResultData {
        id: call_id.to_string(),
        content: vec![ContentBlock::text("tool call denied by user")],
        status: ToolResultStatus::Denied,
    }
}

fn map_lace_err<T>(result: LaceResult<T>) -> Result<T, ToolError> {
    result.map_err(|e| ToolError::Internal(e.to_string()))
}

/// A hand-rolled, intentionally minimal JSON-Schema subset checker: object
/// `type`, `required`, and per-property primitive `type`. Good enough to
/// catch the common authoring mistakes (missing/mistyped fields) without a
/// general-purpose schema validator the teacher's stack does not carry.
fn validate_against_schema(value: &serde_json::Value, schema: &serde_json::Value) -> Result<(), ToolError> {
    let Some(schema_obj) = schema.as_object() else {
        return Ok(());
    };
    let Some(obj) = value.as_object() else {
        return Err(ToolError::Validation {
            path: "$".into(),
            message: "expected a JSON object".into(),
        });
    };

    if let Some(required) = schema_obj.get("required").and_then(|r| r.as_array()) {
        for field in required {
            let Some(name) = field.as_str() else { continue };
            if !obj.contains_key(name) {
                return Err(ToolError::Validation {
                    path: format!("$.{name}"),
                    message: "missing required field".into(),
                });
            }
        }
    }

    if let Some(properties) = schema_obj.get("properties").and_then(|p| p.as_object()) {
        for (name, prop_schema) in properties {
            let Some(actual) = obj.get(name) else { continue };
            let Some(expected_type) = prop_schema.get("type").and_then(|t| t.as_str()) else {
                continue;
            };
            if !matches_json_type(actual, expected_type) {
                return Err(ToolError::Validation {
                    path: format!("$.{name}"),
                    message: format!("expected type {expected_type}"),
                });
            }
        }
    }

    Ok(())
}

fn matches_json_type(value: &serde_json::Value, expected: &str) -> bool {
    match expected {
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64(),
        "boolean" => value.is_boolean(),
        "object" => value.is_object(),
        "array" => value.is_array(),
        "null" => value.is_null(),
        _ => true,
    }
}
