//! The `bash` built-in tool (§4.D). Non-zero exit is an in-band result,
//! not a tool failure: the shell ran, and the caller sees the exit code.

use std::time::Instant;

use async_trait::async_trait;
use lace_core::ContentBlock;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::context::{Tool, ToolAnnotations, ToolContext};
use crate::error::ToolError;

const HEAD_LINES: usize = 100;
const TAIL_LINES: usize = 50;
const HARD_CAP_BYTES: usize = 10 * 1024;

#[derive(Deserialize)]
struct BashArgs {
    command: String,
}

pub struct BashTool;

#[async_trait]
impl Tool for BashTool {
    fn name(&self) -> &str {
        "bash"
    }

    fn description(&self) -> &str {
        "Run a shell command and return its exit code, stdout, and stderr."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "command": { "type": "string", "description": "The shell command to run." }
            },
            "required": ["command"],
        })
    }

    fn annotations(&self) -> ToolAnnotations {
        ToolAnnotations::builder()
            .title("Run shell command")
            .destructive(true)
            .open_world(true)
    }

    async fn execute_validated(
        &self,
        args: Value,
        ctx: &ToolContext,
    ) -> Result<Vec<ContentBlock>, ToolError> {
        let args: BashArgs = serde_json::from_value(args).map_err(|e| ToolError::Validation {
            path: "$.command".into(),
            message: e.to_string(),
        })?;
        if args.command.trim().is_empty() {
            return Err(ToolError::Validation {
                path: "$.command".into(),
                message: "command must not be empty".into(),
            });
        }

        let mut cmd = if cfg!(target_os = "windows") {
            let mut cmd = Command::new("cmd");
            cmd.args(["/C", &args.command]);
            cmd
        } else {
            let mut cmd = Command::new("sh");
            cmd.args(["-lc", &args.command]);
            cmd
        };
        if let Some(cwd) = &ctx.working_directory {
            cmd.current_dir(cwd);
        }
        cmd.stdout(std::process::Stdio::piped());
        cmd.stderr(std::process::Stdio::piped());

        let start = Instant::now();
        let mut child = cmd.spawn().map_err(ToolError::Io)?;

        let wait_handle = tokio::spawn(async move {
            use tokio::io::AsyncReadExt;
            let mut stdout_buf = Vec::new();
            let mut stderr_buf = Vec::new();
            let mut stdout = child.stdout.take();
            let mut stderr = child.stderr.take();
            let (_, _) = tokio::join!(
                async {
                    if let Some(ref mut s) = stdout {
                        let _ = s.read_to_end(&mut stdout_buf).await;
                    }
                },
                async {
                    if let Some(ref mut s) = stderr {
                        let _ = s.read_to_end(&mut stderr_buf).await;
                    }
                },
            );
            let status = child.wait().await?;
            Ok::<_, std::io::Error>((status, stdout_buf, stderr_buf))
        });
        tokio::pin!(wait_handle);

        let (status, stdout_buf, stderr_buf) = tokio::select! {
            result = &mut wait_handle => {
                result.map_err(|e| ToolError::Internal(format!("task join failed: {e}")))?
                    .map_err(ToolError::Io)?
            }
            _ = ctx.cancel.cancelled() => {
                wait_handle.abort();
                return Err(ToolError::Cancelled);
            }
        };
        let runtime_ms = start.elapsed().as_millis() as u64;
        let exit_code = status.code().unwrap_or(-1);

        tokio::fs::create_dir_all(&ctx.temp_dir).await.map_err(ToolError::Io)?;
        let stdout_path = ctx.temp_dir.join("stdout.log");
        let stderr_path = ctx.temp_dir.join("stderr.log");
        let combined_path = ctx.temp_dir.join("combined.log");
        write_all(&stdout_path, &stdout_buf).await?;
        write_all(&stderr_path, &stderr_buf).await?;
        write_combined(&combined_path, &stdout_buf, &stderr_buf).await?;

        let stdout_str = String::from_utf8_lossy(&stdout_buf);
        let stderr_str = String::from_utf8_lossy(&stderr_buf);
        let (stdout_preview, stdout_total, stdout_skipped) = truncate(&stdout_str);
        let (stderr_preview, stderr_total, stderr_skipped) = truncate(&stderr_str);

        let payload = json!({
            "exitCode": exit_code,
            "stdoutPreview": stdout_preview,
            "stderrPreview": stderr_preview,
            "runtime": runtime_ms,
            "truncated": {
                "stdout": { "total": stdout_total, "skipped": stdout_skipped },
                "stderr": { "total": stderr_total, "skipped": stderr_skipped },
            },
            "outputFiles": {
                "stdout": stdout_path.display().to_string(),
                "stderr": stderr_path.display().to_string(),
                "combined": combined_path.display().to_string(),
            },
        });

        Ok(vec![ContentBlock::text(payload.to_string())])
    }
}

async fn write_all(path: &std::path::Path, bytes: &[u8]) -> Result<(), ToolError> {
    let mut file = tokio::fs::File::create(path).await.map_err(ToolError::Io)?;
    file.write_all(bytes).await.map_err(ToolError::Io)?;
    Ok(())
}

async fn write_combined(path: &std::path::Path, stdout: &[u8], stderr: &[u8]) -> Result<(), ToolError> {
    let mut file = tokio::fs::File::create(path).await.map_err(ToolError::Io)?;
    file.write_all(b"--- stdout ---\n").await.map_err(ToolError::Io)?;
    file.write_all(stdout).await.map_err(ToolError::Io)?;
    file.write_all(b"\n--- stderr ---\n").await.map_err(ToolError::Io)?;
    file.write_all(stderr).await.map_err(ToolError::Io)?;
    Ok(())
}

/// Keeps the first `HEAD_LINES` and last `TAIL_LINES`, joined with an
/// ellipsis marker, then enforces a hard byte cap on the result.
fn truncate(text: &str) -> (String, usize, usize) {
    let lines: Vec<&str> = text.lines().collect();
    let total = lines.len();

    let mut preview = if total <= HEAD_LINES + TAIL_LINES {
        text.to_string()
    } else {
        let head = &lines[..HEAD_LINES];
        let tail = &lines[total - TAIL_LINES..];
        let skipped = total - HEAD_LINES - TAIL_LINES;
        format!(
            "{}\n... ({skipped} lines omitted) ...\n{}",
            head.join("\n"),
            tail.join("\n")
        )
    };
    let skipped = total.saturating_sub(HEAD_LINES + TAIL_LINES);

    if preview.len() > HARD_CAP_BYTES {
        let mut cut = HARD_CAP_BYTES;
        while !preview.is_char_boundary(cut) {
            cut -= 1;
        }
        preview.truncate(cut);
        preview.push_str("\n... (truncated)");
    }

    (preview, total, skipped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_util::sync::CancellationToken;

    fn ctx(dir: &tempfile::TempDir) -> ToolContext {
        ToolContext {
            working_directory: None,
            temp_dir: dir.path().to_path_buf(),
            cancel: CancellationToken::new(),
        }
    }

    #[tokio::test]
    async fn echo_succeeds_with_exit_code_zero() {
        let dir = tempfile::tempdir().unwrap();
        let tool = BashTool;
        let out = tool
            .execute_validated(json!({"command": "echo hi"}), &ctx(&dir))
            .await
            .unwrap();
        let payload: Value = serde_json::from_str(out[0].as_text()).unwrap();
        assert_eq!(payload["exitCode"], 0);
        assert!(payload["stdoutPreview"].as_str().unwrap().contains("hi"));
    }

    #[tokio::test]
    async fn nonzero_exit_is_a_completed_result_not_a_tool_error() {
        let dir = tempfile::tempdir().unwrap();
        let tool = BashTool;
        let result = tool
            .execute_validated(json!({"command": "exit 3"}), &ctx(&dir))
            .await;
        assert!(result.is_ok());
        let payload: Value = serde_json::from_str(result.unwrap()[0].as_text()).unwrap();
        assert_eq!(payload["exitCode"], 3);
    }

    #[tokio::test]
    async fn empty_command_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let tool = BashTool;
        let result = tool.execute_validated(json!({"command": "   "}), &ctx(&dir)).await;
        assert!(matches!(result, Err(ToolError::Validation { .. })));
    }

    #[test]
    fn truncate_keeps_head_and_tail_for_long_output() {
        let text = (1..=200).map(|n| format!("line{n}")).collect::<Vec<_>>().join("\n");
        let (preview, total, skipped) = truncate(&text);
        assert_eq!(total, 200);
        assert_eq!(skipped, 50);
        assert!(preview.contains("line1\n"));
        assert!(preview.contains("line200"));
        assert!(preview.contains("omitted"));
    }

    #[test]
    fn truncate_passes_short_output_through_unchanged() {
        let (preview, total, skipped) = truncate("a\nb\nc");
        assert_eq!(preview, "a\nb\nc");
        assert_eq!(total, 3);
        assert_eq!(skipped, 0);
    }
}
