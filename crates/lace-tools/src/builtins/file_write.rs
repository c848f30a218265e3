//! The `file_write` built-in tool (§4.D): overwrite-always, with parent
//! directory creation on by default.

use async_trait::async_trait;
use lace_core::ContentBlock;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::context::{Tool, ToolAnnotations, ToolContext};
use crate::error::ToolError;

fn default_true() -> bool {
    true
}

#[derive(Deserialize)]
struct FileWriteArgs {
    path: String,
    content: String,
    #[serde(rename = "createDirs", default = "default_true")]
    create_dirs: bool,
}

pub struct FileWriteTool;

#[async_trait]
impl Tool for FileWriteTool {
    fn name(&self) -> &str {
        "file_write"
    }

    fn description(&self) -> &str {
        "Write (overwriting) a file's contents, creating parent directories by default."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string" },
                "content": { "type": "string" },
                "createDirs": { "type": "boolean", "default": true },
            },
            "required": ["path", "content"],
        })
    }

    fn annotations(&self) -> ToolAnnotations {
        ToolAnnotations::builder()
            .title("Write file")
            .destructive(true)
            .idempotent(true)
    }

    async fn execute_validated(
        &self,
        args: Value,
        ctx: &ToolContext,
    ) -> Result<Vec<ContentBlock>, ToolError> {
        let args: FileWriteArgs = serde_json::from_value(args).map_err(|e| ToolError::Validation {
            path: "$".into(),
            message: e.to_string(),
        })?;

        let target = ctx.resolve_path(&args.path);
        let parent = target.parent();

        match parent {
            Some(parent) if !parent.as_os_str().is_empty() && !parent.exists() => {
                if args.create_dirs {
                    tokio::fs::create_dir_all(parent).await.map_err(ToolError::Io)?;
                } else {
                    return Err(ToolError::ParentMissing {
                        path: args.path.clone(),
                    });
                }
            }
            _ => {}
        }

        tokio::fs::write(&target, args.content.as_bytes())
            .await
            .map_err(ToolError::Io)?;

        Ok(vec![ContentBlock::text(format!(
            "wrote {} bytes to {}",
            args.content.len(),
            target.display()
        ))])
    }
}
