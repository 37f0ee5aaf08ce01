//! The read tool.

use base64::Engine as _;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

use super::error::ToolError;
use super::tool::{DisplayData, Tool, ToolOutput, check_cancelled, decode_params};
use super::truncate::{
    DEFAULT_MAX_BYTES, DEFAULT_MAX_LINES, TruncationOptions, format_size, truncate_head,
};
use super::workspace::Workspace;
use async_trait::async_trait;

const READ_TOOL_NAME: &str = "read";

/// Reads file contents from disk, with offset/limit paging for large files
/// and base64 payloads for known image extensions.
pub struct ReadTool {
    workspace: Workspace,
    max_lines: usize,
    max_bytes: usize,
}

impl ReadTool {
    pub fn new(workspace: Workspace) -> Self {
        Self {
            workspace,
            max_lines: DEFAULT_MAX_LINES,
            max_bytes: DEFAULT_MAX_BYTES,
        }
    }
}

#[derive(Deserialize)]
struct ReadParams {
    #[serde(default)]
    #[allow(dead_code)]
    label: Option<String>,
    #[serde(default)]
    path: String,
    #[serde(default)]
    offset: Option<i64>,
    #[serde(default)]
    limit: Option<i64>,
}

fn image_mime_type(path: &std::path::Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "jpg" | "jpeg" => Some("image/jpeg"),
        "png" => Some("image/png"),
        "gif" => Some("image/gif"),
        "webp" => Some("image/webp"),
        _ => None,
    }
}

#[async_trait]
impl Tool for ReadTool {
    fn name(&self) -> &str {
        READ_TOOL_NAME
    }

    fn description(&self) -> String {
        format!(
            "Read the contents of a file. Supports text files and images (jpg, png, gif, webp). For text files, output is truncated to {} lines or {}KB (whichever is hit first). Use offset/limit for large files.",
            self.max_lines,
            self.max_bytes / 1024
        )
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "label": {"type": "string", "description": "Brief description of what you're reading and why (shown to user)"},
                "path": {"type": "string", "description": "Path to the file to read (relative or absolute)"},
                "offset": {"type": "number", "description": "Line number to start reading from (1-indexed)"},
                "limit": {"type": "number", "description": "Maximum number of lines to read"}
            },
            "required": ["path"]
        })
    }

    async fn execute(
        &self,
        cancel: &CancellationToken,
        params: &Value,
    ) -> Result<ToolOutput, ToolError> {
        check_cancelled(cancel)?;
        let input: ReadParams = decode_params(params)?;
        let path_arg = input.path.trim().to_string();
        if path_arg.is_empty() {
            return Err(ToolError::InvalidParams("path is required".to_string()));
        }

        let path = self.workspace.resolve(&path_arg, false)?;

        if let Some(mime_type) = image_mime_type(&path) {
            let raw = tokio::fs::read(&path).await?;
            let payload = json!({
                "path": path_arg,
                "bytes": raw.len(),
                "mime_type": mime_type,
                "image_base64": base64::engine::general_purpose::STANDARD.encode(&raw),
            });
            return Ok(ToolOutput {
                content: format!("Read image file [{mime_type}]"),
                display: DisplayData::new("file_content", payload),
                error: None,
            });
        }

        let raw = tokio::fs::read(&path).await?;
        let all_content = String::from_utf8_lossy(&raw).into_owned();
        let all_lines: Vec<&str> = all_content.split('\n').collect();
        let total_file_lines = all_lines.len();

        let start_line = match input.offset {
            Some(offset) => offset.max(1) as usize,
            None => 1,
        };
        if start_line > total_file_lines {
            return Err(ToolError::Failed(format!(
                "Offset {start_line} is beyond end of file ({total_file_lines} lines total)"
            )));
        }

        let mut selected: String = all_lines[start_line - 1..].join("\n");
        let mut user_limited_lines: Option<usize> = None;
        if let Some(limit) = input.limit {
            if limit < 0 {
                return Err(ToolError::InvalidParams("limit must be >= 0".to_string()));
            }
            let lines: Vec<&str> = selected.split('\n').collect();
            let end = (limit as usize).min(lines.len());
            selected = lines[..end].join("\n");
            user_limited_lines = Some(end);
        }

        let truncation = truncate_head(
            &selected,
            TruncationOptions {
                max_lines: self.max_lines,
                max_bytes: self.max_bytes,
            },
        );

        let mut payload = serde_json::Map::new();
        payload.insert("path".to_string(), json!(path_arg));

        let output_text = if truncation.first_line_exceeds_limit {
            let first_line = selected.split('\n').next().unwrap_or_default();
            payload.insert("truncation".to_string(), json!(truncation));
            format!(
                "[Line {start_line} is {}, exceeds {} limit. Use bash: sed -n '{start_line}p' {path_arg} | head -c {}]",
                format_size(first_line.len()),
                format_size(self.max_bytes),
                self.max_bytes
            )
        } else if truncation.truncated {
            let end_line = start_line + truncation.output_lines - 1;
            let next_offset = end_line + 1;
            let footer = if truncation.truncated_by == "lines" {
                format!(
                    "\n\n[Showing lines {start_line}-{end_line} of {total_file_lines}. Use offset={next_offset} to continue]"
                )
            } else {
                format!(
                    "\n\n[Showing lines {start_line}-{end_line} of {total_file_lines} ({} limit). Use offset={next_offset} to continue]",
                    format_size(self.max_bytes)
                )
            };
            payload.insert("truncation".to_string(), json!(truncation));
            format!("{}{footer}", truncation.content)
        } else if let Some(limited) = user_limited_lines {
            let consumed = start_line - 1 + limited;
            if consumed < total_file_lines {
                let remaining = total_file_lines - consumed;
                let next_offset = start_line + limited;
                format!(
                    "{}\n\n[{remaining} more lines in file. Use offset={next_offset} to continue]",
                    truncation.content
                )
            } else {
                truncation.content
            }
        } else {
            truncation.content
        };

        Ok(ToolOutput {
            content: output_text,
            display: DisplayData::new("file_content", Value::Object(payload)),
            error: None,
        })
    }
}
