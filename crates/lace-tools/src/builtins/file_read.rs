//! The `file_read` built-in tool (§4.D). Whole-file reads are refused
//! beyond a size cap; ranged reads are capped at a line count instead.

use async_trait::async_trait;
use lace_core::ContentBlock;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::context::{Tool, ToolAnnotations, ToolContext};
use crate::error::ToolError;

const WHOLE_FILE_CAP_BYTES: u64 = 32 * 1024;
const MAX_RANGE_LINES: usize = 100;

#[derive(Deserialize)]
struct FileReadArgs {
    path: String,
    #[serde(rename = "startLine")]
    start_line: Option<usize>,
    #[serde(rename = "endLine")]
    end_line: Option<usize>,
}

pub struct FileReadTool;

#[async_trait]
impl Tool for FileReadTool {
    fn name(&self) -> &str {
        "file_read"
    }

    fn description(&self) -> &str {
        "Read a file, in full or by 1-indexed inclusive line range."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string" },
                "startLine": { "type": "integer" },
                "endLine": { "type": "integer" },
            },
            "required": ["path"],
        })
    }

    fn annotations(&self) -> ToolAnnotations {
        ToolAnnotations::builder().title("Read file").read_only(true)
    }

    async fn execute_validated(
        &self,
        args: Value,
        ctx: &ToolContext,
    ) -> Result<Vec<ContentBlock>, ToolError> {
        let args: FileReadArgs = serde_json::from_value(args).map_err(|e| ToolError::Validation {
            path: "$".into(),
            message: e.to_string(),
        })?;

        if let (Some(start), Some(end)) = (args.start_line, args.end_line) {
            if end < start {
                return Err(ToolError::EndBeforeStart { start, end });
            }
        }

        let target = ctx.resolve_path(&args.path);
        let metadata = tokio::fs::metadata(&target)
            .await
            .map_err(|_| ToolError::FileNotFound(args.path.clone()))?;

        let ranged = args.start_line.is_some() || args.end_line.is_some();
        if !ranged && metadata.len() > WHOLE_FILE_CAP_BYTES {
            return Err(ToolError::RangeTooLarge {
                max: WHOLE_FILE_CAP_BYTES as usize,
            });
        }

        let content = tokio::fs::read_to_string(&target).await.map_err(ToolError::Io)?;
        let lines: Vec<&str> = content.lines().collect();
        let total = lines.len();

        let (start_idx, end_idx) = match (args.start_line, args.end_line) {
            (None, None) => (0, total),
            (Some(start), end_opt) => {
                if start == 0 {
                    return Err(ToolError::Validation {
                        path: "$.startLine".into(),
                        message: "startLine is 1-indexed and must be >= 1".into(),
                    });
                }
                if start > total {
                    return Err(ToolError::StartLineExceedsLength { start, length: total });
                }
                let end = end_opt.unwrap_or(total).min(total);
                (start - 1, end)
            }
            (None, Some(end)) => (0, end.min(total)),
        };

        if end_idx.saturating_sub(start_idx) > MAX_RANGE_LINES {
            return Err(ToolError::RangeTooLarge { max: MAX_RANGE_LINES });
        }

        let body = lines[start_idx..end_idx].join("\n");
        Ok(vec![ContentBlock::text(body)])
    }
}
