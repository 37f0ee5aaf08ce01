//! The bash tool: synchronous shell execution with tail truncation.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;

use super::error::ToolError;
use super::tool::{DisplayData, Tool, ToolOutput, check_cancelled, decode_params};
use super::truncate::{
    DEFAULT_MAX_BYTES, DEFAULT_MAX_LINES, TruncationOptions, format_size, truncate_tail,
};

const BASH_TOOL_NAME: &str = "bash";

/// Executes shell commands, keeping the output tail within limits. When
/// output overflows, the full text is saved to a temp file referenced from
/// the footer and display payload.
pub struct BashTool {
    max_output_lines: usize,
    max_output_bytes: usize,
}

impl BashTool {
    pub fn new() -> Self {
        Self {
            max_output_lines: DEFAULT_MAX_LINES,
            max_output_bytes: DEFAULT_MAX_BYTES,
        }
    }
}

impl Default for BashTool {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Deserialize)]
struct BashParams {
    #[serde(default)]
    #[allow(dead_code)]
    label: Option<String>,
    #[serde(default)]
    command: String,
    #[serde(default)]
    timeout: Option<i64>,
    #[serde(default)]
    timeout_sec: Option<i64>,
}

fn shell_command(command: &str) -> tokio::process::Command {
    #[cfg(windows)]
    {
        let mut cmd = tokio::process::Command::new("cmd");
        cmd.arg("/c").arg(command);
        cmd
    }
    #[cfg(not(windows))]
    {
        let mut cmd = tokio::process::Command::new("/bin/sh");
        cmd.arg("-c").arg(command);
        cmd
    }
}

fn combine_stdout_stderr(stdout: &str, stderr: &str) -> String {
    if stdout.is_empty() {
        return stderr.to_string();
    }
    if stderr.is_empty() {
        return stdout.to_string();
    }
    format!("{stdout}\n{stderr}")
}

fn write_full_output_to_temp_file(output: &str) -> std::io::Result<std::path::PathBuf> {
    use std::io::Write as _;
    let mut file = tempfile::Builder::new()
        .prefix("gar-bash-")
        .suffix(".log")
        .tempfile()?;
    file.write_all(output.as_bytes())?;
    let (_, path) = file.keep().map_err(|e| e.error)?;
    Ok(path)
}

#[async_trait]
impl Tool for BashTool {
    fn name(&self) -> &str {
        BASH_TOOL_NAME
    }

    fn description(&self) -> String {
        format!(
            "Execute a bash command in the current working directory. Returns stdout and stderr. Output is truncated to last {} lines or {}KB (whichever is hit first). If truncated, full output is saved to a temp file. Optionally provide a timeout in seconds.",
            self.max_output_lines,
            self.max_output_bytes / 1024
        )
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "label": {"type": "string", "description": "Brief description of what this command does (shown to user)"},
                "command": {"type": "string", "description": "Bash command to execute"},
                "timeout": {"type": "number", "description": "Timeout in seconds (optional, no default timeout)"}
            },
            "required": ["command"]
        })
    }

    async fn execute(
        &self,
        cancel: &CancellationToken,
        params: &Value,
    ) -> Result<ToolOutput, ToolError> {
        check_cancelled(cancel)?;
        let input: BashParams = decode_params(params)?;

        let command = input.command.trim().to_string();
        if command.is_empty() {
            return Err(ToolError::InvalidParams("command is required".to_string()));
        }
        let timeout_seconds = input.timeout.or(input.timeout_sec).unwrap_or(0);
        if timeout_seconds < 0 {
            return Err(ToolError::InvalidParams("timeout must be >= 0".to_string()));
        }

        let mut child = shell_command(&command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let mut stdout_pipe = child.stdout.take().expect("stdout piped");
        let mut stderr_pipe = child.stderr.take().expect("stderr piped");
        let stdout_task = tokio::spawn(async move {
            let mut buf = Vec::new();
            let _ = stdout_pipe.read_to_end(&mut buf).await;
            buf
        });
        let stderr_task = tokio::spawn(async move {
            let mut buf = Vec::new();
            let _ = stderr_pipe.read_to_end(&mut buf).await;
            buf
        });

        let timeout = Duration::from_secs(timeout_seconds as u64);
        let mut timed_out = false;
        let status = tokio::select! {
            status = child.wait() => Some(status?),
            _ = cancel.cancelled() => {
                let _ = child.kill().await;
                return Err(ToolError::Cancelled);
            }
            _ = tokio::time::sleep(timeout), if timeout_seconds > 0 => {
                timed_out = true;
                let _ = child.kill().await;
                let _ = child.wait().await;
                None
            }
        };

        let stdout = String::from_utf8_lossy(&stdout_task.await.unwrap_or_default()).into_owned();
        let stderr = String::from_utf8_lossy(&stderr_task.await.unwrap_or_default()).into_owned();
        let output = combine_stdout_stderr(&stdout, &stderr);

        let truncation = truncate_tail(
            &output,
            TruncationOptions {
                max_lines: self.max_output_lines,
                max_bytes: self.max_output_bytes,
            },
        );
        let mut output_text = if truncation.content.is_empty() {
            "(no output)".to_string()
        } else {
            truncation.content.clone()
        };

        let mut payload = serde_json::Map::new();
        if truncation.truncated {
            payload.insert("truncation".to_string(), json!(truncation));

            if let Ok(full_output_path) = write_full_output_to_temp_file(&output) {
                let path_display = full_output_path.display().to_string();
                payload.insert("full_output_path".to_string(), json!(path_display));

                let start_line = truncation.total_lines - truncation.output_lines + 1;
                let end_line = truncation.total_lines;
                if truncation.last_line_partial {
                    let last_line_len = output.rsplit('\n').next().unwrap_or_default().len();
                    output_text.push_str(&format!(
                        "\n\n[Showing last {} of line {end_line} (line is {}). Full output: {path_display}]",
                        format_size(truncation.output_bytes),
                        format_size(last_line_len),
                    ));
                } else if truncation.truncated_by == "lines" {
                    output_text.push_str(&format!(
                        "\n\n[Showing lines {start_line}-{end_line} of {}. Full output: {path_display}]",
                        truncation.total_lines,
                    ));
                } else {
                    output_text.push_str(&format!(
                        "\n\n[Showing lines {start_line}-{end_line} of {} ({} limit). Full output: {path_display}]",
                        truncation.total_lines,
                        format_size(self.max_output_bytes),
                    ));
                }
            }
        }

        let error = if timed_out {
            Some(format!("Command timed out after {timeout_seconds} seconds"))
        } else {
            match status {
                Some(status) if status.success() => None,
                Some(status) => Some(format!(
                    "Command exited with code {}",
                    status.code().unwrap_or(1)
                )),
                None => None,
            }
        };

        Ok(ToolOutput {
            content: output_text,
            display: DisplayData::new("bash_output", Value::Object(payload)),
            error,
        })
    }
}
