//! The ls tool: directory listing.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

use super::error::ToolError;
use super::tool::{DisplayData, Tool, ToolOutput, check_cancelled, decode_params};
use super::truncate::{DEFAULT_MAX_BYTES, TruncationOptions, format_size, truncate_head};
use super::workspace::Workspace;

const LS_TOOL_NAME: &str = "ls";
const DEFAULT_LS_LIMIT: usize = 500;
const LS_DISPLAY_KIND: &str = "ls_result";

/// Lists directory entries alphabetically, dotfiles included.
pub struct LsTool {
    workspace: Workspace,
}

impl LsTool {
    pub fn new(workspace: Workspace) -> Self {
        Self { workspace }
    }
}

#[derive(Deserialize)]
struct LsParams {
    #[serde(default)]
    #[allow(dead_code)]
    label: Option<String>,
    #[serde(default)]
    path: String,
    #[serde(default)]
    limit: Option<i64>,
}

#[async_trait]
impl Tool for LsTool {
    fn name(&self) -> &str {
        LS_TOOL_NAME
    }

    fn description(&self) -> String {
        format!(
            "List directory contents. Returns entries sorted alphabetically, with '/' suffix for directories. Includes dotfiles. Output is truncated to {DEFAULT_LS_LIMIT} entries or {}KB (whichever is hit first).",
            DEFAULT_MAX_BYTES / 1024
        )
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "label": {"type": "string", "description": "Brief description of what you're listing (shown to user)"},
                "path": {"type": "string", "description": "Directory to list (default: current directory)"},
                "limit": {"type": "number", "description": "Maximum number of entries to return (default: 500)"}
            }
        })
    }

    async fn execute(
        &self,
        cancel: &CancellationToken,
        params: &Value,
    ) -> Result<ToolOutput, ToolError> {
        check_cancelled(cancel)?;
        let input: LsParams = decode_params(params)?;

        let path_arg = {
            let trimmed = input.path.trim();
            if trimmed.is_empty() { "." } else { trimmed }.to_string()
        };
        let effective_limit = match input.limit {
            Some(limit) if limit <= 0 => {
                return Err(ToolError::InvalidParams("limit must be > 0".to_string()));
            }
            Some(limit) => limit as usize,
            None => DEFAULT_LS_LIMIT,
        };

        let dir_path = self.workspace.resolve(&path_arg, false)?;
        if !std::fs::metadata(&dir_path)?.is_dir() {
            return Err(ToolError::Failed(format!("not a directory: {path_arg}")));
        }

        let mut entries: Vec<(String, bool)> = Vec::new();
        for entry in std::fs::read_dir(&dir_path)? {
            let entry = entry?;
            let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
            entries.push((entry.file_name().to_string_lossy().into_owned(), is_dir));
        }
        entries.sort_by(|a, b| a.0.to_lowercase().cmp(&b.0.to_lowercase()));

        let mut results: Vec<String> = Vec::new();
        let mut limit_reached = false;
        for (name, is_dir) in &entries {
            if results.len() >= effective_limit {
                limit_reached = true;
                break;
            }
            if *is_dir {
                results.push(format!("{name}/"));
            } else {
                results.push(name.clone());
            }
        }

        if results.is_empty() {
            return Ok(ToolOutput {
                content: "(empty directory)".to_string(),
                display: DisplayData::new(LS_DISPLAY_KIND, Value::Null),
                error: None,
            });
        }

        let raw_output = results.join("\n");
        let truncation = truncate_head(
            &raw_output,
            TruncationOptions {
                max_lines: usize::MAX,
                max_bytes: DEFAULT_MAX_BYTES,
            },
        );
        let mut output = truncation.content.clone();

        let mut payload = serde_json::Map::new();
        let mut notices: Vec<String> = Vec::new();
        if limit_reached {
            notices.push(format!(
                "{effective_limit} entries limit reached. Use limit={} for more",
                effective_limit * 2
            ));
            payload.insert("entry_limit_reached".to_string(), json!(effective_limit));
        }
        if truncation.truncated {
            notices.push(format!("{} limit reached", format_size(DEFAULT_MAX_BYTES)));
            payload.insert("truncation".to_string(), json!(truncation));
        }
        if !notices.is_empty() {
            output.push_str(&format!("\n\n[{}]", notices.join(". ")));
        }

        Ok(ToolOutput {
            content: output,
            display: DisplayData::new(LS_DISPLAY_KIND, Value::Object(payload)),
            error: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn ls_tool(dir: &TempDir) -> LsTool {
        LsTool::new(Workspace::new(dir.path()))
    }

    #[tokio::test]
    async fn lists_sorted_with_dir_suffix() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("Zoo")).unwrap();
        std::fs::write(dir.path().join("apple.txt"), "x").unwrap();
        std::fs::write(dir.path().join(".hidden"), "x").unwrap();
        let tool = ls_tool(&dir);

        let output = tool
            .execute(&CancellationToken::new(), &json!({}))
            .await
            .unwrap();
        assert_eq!(output.content, ".hidden\napple.txt\nZoo/");
    }

    #[tokio::test]
    async fn empty_directory_message() {
        let dir = TempDir::new().unwrap();
        let tool = ls_tool(&dir);
        let output = tool
            .execute(&CancellationToken::new(), &json!({}))
            .await
            .unwrap();
        assert_eq!(output.content, "(empty directory)");
    }

    #[tokio::test]
    async fn entry_limit_notice() {
        let dir = TempDir::new().unwrap();
        for i in 0..5 {
            std::fs::write(dir.path().join(format!("f{i}")), "x").unwrap();
        }
        let tool = ls_tool(&dir);

        let output = tool
            .execute(&CancellationToken::new(), &json!({"limit": 2}))
            .await
            .unwrap();
        assert!(output.content.starts_with("f0\nf1"));
        assert!(output.content.contains("2 entries limit reached"));
    }

    #[tokio::test]
    async fn non_directory_fails() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("file"), "x").unwrap();
        let tool = ls_tool(&dir);
        let err = tool
            .execute(&CancellationToken::new(), &json!({"path": "file"}))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not a directory"));
    }
}
