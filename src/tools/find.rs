//! The find tool: glob-based file search.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use walkdir::WalkDir;

use super::error::ToolError;
use super::glob::matches_glob;
use super::grep::SKIPPED_DIRS;
use super::tool::{DisplayData, Tool, ToolOutput, check_cancelled, decode_params};
use super::truncate::{DEFAULT_MAX_BYTES, TruncationOptions, format_size, truncate_head};
use super::workspace::Workspace;

const FIND_TOOL_NAME: &str = "find";
const DEFAULT_FIND_LIMIT: usize = 1000;
const FIND_DISPLAY_KIND: &str = "find_result";

/// Finds files and directories by glob pattern.
pub struct FindTool {
    workspace: Workspace,
}

impl FindTool {
    pub fn new(workspace: Workspace) -> Self {
        Self { workspace }
    }
}

#[derive(Deserialize)]
struct FindParams {
    #[serde(default)]
    #[allow(dead_code)]
    label: Option<String>,
    #[serde(default)]
    pattern: String,
    #[serde(default)]
    path: String,
    #[serde(default)]
    limit: Option<i64>,
}

#[async_trait]
impl Tool for FindTool {
    fn name(&self) -> &str {
        FIND_TOOL_NAME
    }

    fn description(&self) -> String {
        format!(
            "Search for files by glob pattern. Returns matching file paths relative to the search directory. Respects common ignore folders. Output is truncated to {DEFAULT_FIND_LIMIT} results or {}KB (whichever is hit first).",
            DEFAULT_MAX_BYTES / 1024
        )
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "label": {"type": "string", "description": "Brief description of what you're searching for (shown to user)"},
                "pattern": {"type": "string", "description": "Glob pattern to match files, e.g. '*.rs', '**/*.json', or 'src/**/*.spec.rs'"},
                "path": {"type": "string", "description": "Directory to search in (default: current directory)"},
                "limit": {"type": "number", "description": "Maximum number of results (default: 1000)"}
            },
            "required": ["pattern"]
        })
    }

    async fn execute(
        &self,
        cancel: &CancellationToken,
        params: &Value,
    ) -> Result<ToolOutput, ToolError> {
        check_cancelled(cancel)?;
        let input: FindParams = decode_params(params)?;

        let pattern = input.pattern.trim().to_string();
        if pattern.is_empty() {
            return Err(ToolError::InvalidParams("pattern is required".to_string()));
        }
        let path_arg = {
            let trimmed = input.path.trim();
            if trimmed.is_empty() { "." } else { trimmed }.to_string()
        };
        let effective_limit = match input.limit {
            Some(limit) if limit <= 0 => {
                return Err(ToolError::InvalidParams("limit must be > 0".to_string()));
            }
            Some(limit) => limit as usize,
            None => DEFAULT_FIND_LIMIT,
        };

        let search_path = self.workspace.resolve(&path_arg, false)?;
        if !std::fs::metadata(&search_path)?.is_dir() {
            return Err(ToolError::Failed(format!("not a directory: {path_arg}")));
        }

        let mut results: Vec<String> = Vec::new();
        let mut limit_reached = false;

        let walker = WalkDir::new(&search_path)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| {
                !(entry.file_type().is_dir()
                    && SKIPPED_DIRS.contains(&entry.file_name().to_string_lossy().as_ref()))
            });
        for entry in walker {
            check_cancelled(cancel)?;
            let entry = entry.map_err(|e| ToolError::Failed(format!("find walk: {e}")))?;
            if entry.path() == search_path {
                continue;
            }

            let rel = entry
                .path()
                .strip_prefix(&search_path)
                .map_err(|e| ToolError::Failed(format!("find walk: {e}")))?
                .to_string_lossy()
                .replace('\\', "/");
            let display = if entry.file_type().is_dir() {
                format!("{rel}/")
            } else {
                rel.clone()
            };

            if !matches_glob(&pattern, &rel) && !matches_glob(&pattern, &display) {
                continue;
            }

            results.push(display);
            if results.len() >= effective_limit {
                limit_reached = true;
                break;
            }
        }

        if results.is_empty() {
            return Ok(ToolOutput {
                content: "No files found matching pattern".to_string(),
                display: DisplayData::new(FIND_DISPLAY_KIND, Value::Null),
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
                "{effective_limit} results limit reached. Use limit={} for more, or refine pattern",
                effective_limit * 2
            ));
            payload.insert("result_limit_reached".to_string(), json!(effective_limit));
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
            display: DisplayData::new(FIND_DISPLAY_KIND, Value::Object(payload)),
            error: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn find_tool(dir: &TempDir) -> FindTool {
        FindTool::new(Workspace::new(dir.path()))
    }

    #[tokio::test]
    async fn finds_files_by_extension_at_depth() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("src/nested")).unwrap();
        std::fs::write(dir.path().join("src/nested/deep.rs"), "x").unwrap();
        std::fs::write(dir.path().join("top.rs"), "x").unwrap();
        std::fs::write(dir.path().join("other.txt"), "x").unwrap();
        let tool = find_tool(&dir);

        let output = tool
            .execute(&CancellationToken::new(), &json!({"pattern": "*.rs"}))
            .await
            .unwrap();
        assert!(output.content.contains("src/nested/deep.rs"));
        assert!(output.content.contains("top.rs"));
        assert!(!output.content.contains("other.txt"));
    }

    #[tokio::test]
    async fn directories_get_trailing_slash() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("pkg")).unwrap();
        let tool = find_tool(&dir);

        let output = tool
            .execute(&CancellationToken::new(), &json!({"pattern": "pkg/"}))
            .await
            .unwrap();
        assert_eq!(output.content, "pkg/");
    }

    #[tokio::test]
    async fn skips_ignored_directories() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("node_modules/lib")).unwrap();
        std::fs::write(dir.path().join("node_modules/lib/a.js"), "x").unwrap();
        std::fs::write(dir.path().join("b.js"), "x").unwrap();
        let tool = find_tool(&dir);

        let output = tool
            .execute(&CancellationToken::new(), &json!({"pattern": "**/*.js"}))
            .await
            .unwrap();
        assert_eq!(output.content, "b.js");
    }

    #[tokio::test]
    async fn limit_truncates_results() {
        let dir = TempDir::new().unwrap();
        for i in 0..10 {
            std::fs::write(dir.path().join(format!("f{i}.txt")), "x").unwrap();
        }
        let tool = find_tool(&dir);

        let output = tool
            .execute(
                &CancellationToken::new(),
                &json!({"pattern": "*.txt", "limit": 3}),
            )
            .await
            .unwrap();
        assert!(output.content.contains("3 results limit reached"));
    }

    #[tokio::test]
    async fn no_results_message() {
        let dir = TempDir::new().unwrap();
        let tool = find_tool(&dir);
        let output = tool
            .execute(&CancellationToken::new(), &json!({"pattern": "*.zig"}))
            .await
            .unwrap();
        assert_eq!(output.content, "No files found matching pattern");
    }

    #[tokio::test]
    async fn search_path_must_be_directory() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("file.txt"), "x").unwrap();
        let tool = find_tool(&dir);
        let err = tool
            .execute(
                &CancellationToken::new(),
                &json!({"pattern": "*", "path": "file.txt"}),
            )
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not a directory"));
    }
}
