//! The grep tool: content search with context lines and match limits.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use walkdir::WalkDir;

use super::diff::normalize_to_lf;
use super::error::ToolError;
use super::glob::matches_glob;
use super::tool::{DisplayData, Tool, ToolOutput, check_cancelled, decode_params};
use super::truncate::{
    DEFAULT_MAX_BYTES, GREP_MAX_LINE_LEN, TruncationOptions, format_size, truncate_head,
    truncate_line,
};
use super::workspace::Workspace;

const GREP_TOOL_NAME: &str = "grep";
const DEFAULT_GREP_LIMIT: usize = 100;
const GREP_DISPLAY_KIND: &str = "grep_result";

/// Directories never descended into during searches.
pub(crate) const SKIPPED_DIRS: &[&str] = &[".git", "node_modules"];

/// Searches file contents for a regex or literal pattern.
pub struct GrepTool {
    workspace: Workspace,
}

impl GrepTool {
    pub fn new(workspace: Workspace) -> Self {
        Self { workspace }
    }
}

#[derive(Deserialize)]
struct GrepParams {
    #[serde(default)]
    #[allow(dead_code)]
    label: Option<String>,
    #[serde(default)]
    pattern: String,
    #[serde(default)]
    path: String,
    #[serde(default)]
    glob: String,
    #[serde(default, rename = "ignoreCase")]
    ignore_case: bool,
    #[serde(default)]
    literal: bool,
    #[serde(default)]
    context: Option<i64>,
    #[serde(default)]
    limit: Option<i64>,
}

struct GrepMatch {
    file: PathBuf,
    line: usize,
}

/// Walk a search root collecting candidate files, skipping ignored dirs.
pub(crate) fn collect_files(root: &Path, root_is_dir: bool) -> Result<Vec<PathBuf>, ToolError> {
    if !root_is_dir {
        return Ok(vec![root.to_path_buf()]);
    }
    let mut files = Vec::new();
    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            !(entry.file_type().is_dir()
                && SKIPPED_DIRS.contains(&entry.file_name().to_string_lossy().as_ref()))
        });
    for entry in walker {
        let entry = entry.map_err(|e| ToolError::Failed(format!("search walk: {e}")))?;
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

fn display_path(file: &Path, root: &Path, root_is_dir: bool) -> String {
    if root_is_dir {
        if let Ok(rel) = file.strip_prefix(root) {
            return rel.to_string_lossy().replace('\\', "/");
        }
    }
    file.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[async_trait]
impl Tool for GrepTool {
    fn name(&self) -> &str {
        GREP_TOOL_NAME
    }

    fn description(&self) -> String {
        format!(
            "Search file contents for a pattern. Returns matching lines with file paths and line numbers. Output is truncated to {DEFAULT_GREP_LIMIT} matches or {}KB (whichever is hit first). Long lines are truncated to {GREP_MAX_LINE_LEN} chars.",
            DEFAULT_MAX_BYTES / 1024
        )
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "label": {"type": "string", "description": "Brief description of what you're searching for (shown to user)"},
                "pattern": {"type": "string", "description": "Search pattern (regex or literal string)"},
                "path": {"type": "string", "description": "Directory or file to search (default: current directory)"},
                "glob": {"type": "string", "description": "Filter files by glob pattern, e.g. '*.rs' or '**/*.spec.ts'"},
                "ignoreCase": {"type": "boolean", "description": "Case-insensitive search (default: false)"},
                "literal": {"type": "boolean", "description": "Treat pattern as literal string instead of regex (default: false)"},
                "context": {"type": "number", "description": "Number of lines to show before and after each match (default: 0)"},
                "limit": {"type": "number", "description": "Maximum number of matches to return (default: 100)"}
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
        let input: GrepParams = decode_params(params)?;

        let pattern = input.pattern.trim().to_string();
        if pattern.is_empty() {
            return Err(ToolError::InvalidParams("pattern is required".to_string()));
        }
        let path_arg = {
            let trimmed = input.path.trim();
            if trimmed.is_empty() { "." } else { trimmed }.to_string()
        };

        let context_lines = match input.context {
            Some(context) if context < 0 => {
                return Err(ToolError::InvalidParams("context must be >= 0".to_string()));
            }
            Some(context) => context as usize,
            None => 0,
        };
        let effective_limit = match input.limit {
            Some(limit) if limit <= 0 => {
                return Err(ToolError::InvalidParams("limit must be > 0".to_string()));
            }
            Some(limit) => limit as usize,
            None => DEFAULT_GREP_LIMIT,
        };

        let search_path = self.workspace.resolve(&path_arg, false)?;
        let search_is_dir = std::fs::metadata(&search_path)?.is_dir();

        let mut pattern_expr = if input.literal {
            regex::escape(&pattern)
        } else {
            pattern.clone()
        };
        if input.ignore_case {
            pattern_expr = format!("(?i){pattern_expr}");
        }
        let re = Regex::new(&pattern_expr)
            .map_err(|e| ToolError::InvalidParams(format!("invalid pattern: {e}")))?;

        let files = collect_files(&search_path, search_is_dir)?;
        let glob_filter = input.glob.trim().to_string();

        let mut matches: Vec<GrepMatch> = Vec::new();
        let mut file_lines: std::collections::HashMap<PathBuf, Vec<String>> =
            std::collections::HashMap::new();

        'files: for file in files {
            check_cancelled(cancel)?;

            let relative = display_path(&file, &search_path, search_is_dir);
            if !glob_filter.is_empty() && !matches_glob(&glob_filter, &relative) {
                continue;
            }

            let Ok(raw) = std::fs::read(&file) else {
                continue;
            };
            let lines: Vec<String> = normalize_to_lf(&String::from_utf8_lossy(&raw))
                .split('\n')
                .map(str::to_string)
                .collect();

            for (idx, line) in lines.iter().enumerate() {
                if !re.is_match(line) {
                    continue;
                }
                matches.push(GrepMatch {
                    file: file.clone(),
                    line: idx + 1,
                });
                if matches.len() >= effective_limit {
                    file_lines.insert(file.clone(), lines);
                    break 'files;
                }
            }
            file_lines.insert(file, lines);
        }

        if matches.is_empty() {
            return Ok(ToolOutput {
                content: "No matches found".to_string(),
                display: DisplayData::new(GREP_DISPLAY_KIND, Value::Null),
                error: None,
            });
        }

        let mut lines_out: Vec<String> = Vec::with_capacity(matches.len() * (1 + 2 * context_lines));
        let mut lines_truncated = false;
        for m in &matches {
            let Some(lines) = file_lines.get(&m.file) else {
                continue;
            };
            let path_display = display_path(&m.file, &search_path, search_is_dir);

            let (start, end) = if context_lines > 0 {
                (
                    m.line.saturating_sub(context_lines).max(1),
                    (m.line + context_lines).min(lines.len()),
                )
            } else {
                (m.line, m.line)
            };

            for line_number in start..=end {
                let original = lines[line_number - 1].replace('\r', "");
                let (text, was_truncated) = truncate_line(&original, GREP_MAX_LINE_LEN);
                if was_truncated {
                    lines_truncated = true;
                }
                if line_number == m.line {
                    lines_out.push(format!("{path_display}:{line_number}: {text}"));
                } else {
                    lines_out.push(format!("{path_display}-{line_number}- {text}"));
                }
            }
        }

        let raw_output = lines_out.join("\n");
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
        if matches.len() >= effective_limit {
            notices.push(format!(
                "{effective_limit} matches limit reached. Use limit={} for more, or refine pattern",
                effective_limit * 2
            ));
            payload.insert("match_limit_reached".to_string(), json!(effective_limit));
        }
        if truncation.truncated {
            notices.push(format!("{} limit reached", format_size(DEFAULT_MAX_BYTES)));
            payload.insert("truncation".to_string(), json!(truncation));
        }
        if lines_truncated {
            notices.push(format!(
                "Some lines truncated to {GREP_MAX_LINE_LEN} chars. Use read tool to see full lines"
            ));
            payload.insert("lines_truncated".to_string(), json!(true));
        }
        if !notices.is_empty() {
            output.push_str(&format!("\n\n[{}]", notices.join(". ")));
        }

        Ok(ToolOutput {
            content: output,
            display: DisplayData::new(GREP_DISPLAY_KIND, Value::Object(payload)),
            error: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn grep_tool(dir: &TempDir) -> GrepTool {
        GrepTool::new(Workspace::new(dir.path()))
    }

    #[tokio::test]
    async fn finds_matches_with_line_numbers() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.txt"), "alpha\nneedle here\nomega").unwrap();
        let tool = grep_tool(&dir);

        let output = tool
            .execute(&CancellationToken::new(), &json!({"pattern": "needle"}))
            .await
            .unwrap();
        assert_eq!(output.content, "a.txt:2: needle here");
    }

    #[tokio::test]
    async fn context_lines_use_dash_markers() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.txt"), "one\ntwo\nthree\nfour\nfive").unwrap();
        let tool = grep_tool(&dir);

        let output = tool
            .execute(
                &CancellationToken::new(),
                &json!({"pattern": "three", "context": 1}),
            )
            .await
            .unwrap();
        assert_eq!(output.content, "a.txt-2- two\na.txt:3: three\na.txt-4- four");
    }

    #[tokio::test]
    async fn literal_mode_escapes_regex() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.txt"), "value = x[0]\nother").unwrap();
        let tool = grep_tool(&dir);

        let output = tool
            .execute(
                &CancellationToken::new(),
                &json!({"pattern": "x[0]", "literal": true}),
            )
            .await
            .unwrap();
        assert!(output.content.contains("x[0]"));
    }

    #[tokio::test]
    async fn ignore_case_matches() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.txt"), "Needle").unwrap();
        let tool = grep_tool(&dir);

        let output = tool
            .execute(
                &CancellationToken::new(),
                &json!({"pattern": "needle", "ignoreCase": true}),
            )
            .await
            .unwrap();
        assert!(output.content.contains("Needle"));
    }

    #[tokio::test]
    async fn match_limit_adds_notice() {
        let dir = TempDir::new().unwrap();
        let many = "needle\n".repeat(20);
        std::fs::write(dir.path().join("a.txt"), many).unwrap();
        let tool = grep_tool(&dir);

        let output = tool
            .execute(
                &CancellationToken::new(),
                &json!({"pattern": "needle", "limit": 5}),
            )
            .await
            .unwrap();
        assert!(output.content.contains("5 matches limit reached"));
        assert_eq!(output.display.payload["match_limit_reached"], 5);
    }

    #[tokio::test]
    async fn skips_git_and_node_modules() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join(".git")).unwrap();
        std::fs::create_dir_all(dir.path().join("node_modules")).unwrap();
        std::fs::write(dir.path().join(".git/config"), "needle").unwrap();
        std::fs::write(dir.path().join("node_modules/x.js"), "needle").unwrap();
        std::fs::write(dir.path().join("src.txt"), "needle").unwrap();
        let tool = grep_tool(&dir);

        let output = tool
            .execute(&CancellationToken::new(), &json!({"pattern": "needle"}))
            .await
            .unwrap();
        assert_eq!(output.content, "src.txt:1: needle");
    }

    #[tokio::test]
    async fn glob_filter_restricts_files() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.rs"), "needle").unwrap();
        std::fs::write(dir.path().join("a.txt"), "needle").unwrap();
        let tool = grep_tool(&dir);

        let output = tool
            .execute(
                &CancellationToken::new(),
                &json!({"pattern": "needle", "glob": "*.rs"}),
            )
            .await
            .unwrap();
        assert_eq!(output.content, "a.rs:1: needle");
    }

    #[tokio::test]
    async fn no_matches_message() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.txt"), "nothing").unwrap();
        let tool = grep_tool(&dir);

        let output = tool
            .execute(&CancellationToken::new(), &json!({"pattern": "needle"}))
            .await
            .unwrap();
        assert_eq!(output.content, "No matches found");
    }

    #[tokio::test]
    async fn invalid_regex_is_rejected() {
        let dir = TempDir::new().unwrap();
        let tool = grep_tool(&dir);
        let err = tool
            .execute(&CancellationToken::new(), &json!({"pattern": "("}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidParams(_)));
    }
}
