//! The edit tool: exact (or unicode-fuzzy) single-occurrence replacement.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

use super::diff::{
    MatchKind, detect_line_ending, find_replacement_target, generate_diff, normalize_to_lf,
    restore_line_endings, strip_bom,
};
use super::error::ToolError;
use super::tool::{DisplayData, Tool, ToolOutput, check_cancelled, decode_params};
use super::workspace::Workspace;

const EDIT_TOOL_NAME: &str = "edit";
const DIFF_CONTEXT_LINES: usize = 4;

/// Replaces one exact text occurrence in an existing file.
///
/// Falls back to unicode-normalized matching (quotes, dashes, spaces,
/// trailing whitespace) when the literal text is absent. Preserves a
/// leading BOM and the file's dominant line ending.
pub struct EditTool {
    workspace: Workspace,
}

impl EditTool {
    pub fn new(workspace: Workspace) -> Self {
        Self { workspace }
    }
}

#[derive(Deserialize)]
struct EditParams {
    #[serde(default)]
    #[allow(dead_code)]
    label: Option<String>,
    #[serde(default)]
    path: String,
    #[serde(default, rename = "oldText")]
    old_text: String,
    #[serde(default, rename = "newText")]
    new_text: String,
    // Legacy aliases.
    #[serde(default)]
    old: String,
    #[serde(default)]
    new: String,
}

#[async_trait]
impl Tool for EditTool {
    fn name(&self) -> &str {
        EDIT_TOOL_NAME
    }

    fn description(&self) -> String {
        "Edit a file by replacing exact text. The oldText must match exactly (including whitespace). Use this for precise, surgical edits.".to_string()
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "label": {"type": "string", "description": "Brief description of the edit you're making (shown to user)"},
                "path": {"type": "string", "description": "Path to the file to edit (relative or absolute)"},
                "oldText": {"type": "string", "description": "Exact text to find and replace (must match exactly)"},
                "newText": {"type": "string", "description": "New text to replace the old text with"}
            },
            "required": ["path", "oldText", "newText"]
        })
    }

    async fn execute(
        &self,
        cancel: &CancellationToken,
        params: &Value,
    ) -> Result<ToolOutput, ToolError> {
        check_cancelled(cancel)?;
        let input: EditParams = decode_params(params)?;

        let path_arg = input.path.trim().to_string();
        if path_arg.is_empty() {
            return Err(ToolError::InvalidParams("path is required".to_string()));
        }

        let old_text = if input.old_text.is_empty() {
            input.old
        } else {
            input.old_text
        };
        let new_text = if input.new_text.is_empty() && !input.new.is_empty() {
            input.new
        } else {
            input.new_text
        };
        if old_text.is_empty() {
            return Err(ToolError::InvalidParams("oldText is required".to_string()));
        }

        let path = self.workspace.resolve(&path_arg, false)?;
        let raw = tokio::fs::read(&path).await?;
        let original = String::from_utf8_lossy(&raw).into_owned();

        let (bom, body) = strip_bom(&original);
        let ending = detect_line_ending(body);
        let content = normalize_to_lf(body);
        let old_lf = normalize_to_lf(&old_text);
        let new_lf = normalize_to_lf(&new_text);

        let Some(found) = find_replacement_target(&content, &old_lf) else {
            return Err(ToolError::Failed(format!(
                "Could not find the exact text in {path_arg}. The old text must match exactly including all whitespace and newlines."
            )));
        };
        if found.occurrences > 1 {
            return Err(ToolError::Failed(format!(
                "Found {} occurrences of the text in {path_arg}. The text must be unique. Please provide more context to make it unique.",
                found.occurrences
            )));
        }

        let mut updated = String::with_capacity(content.len() + new_lf.len());
        updated.push_str(&content[..found.start]);
        updated.push_str(&new_lf);
        updated.push_str(&content[found.end..]);

        if updated == content {
            return Err(ToolError::Failed(format!(
                "No changes made to {path_arg}. The replacement produced identical content. This might indicate an issue with special characters or the text not existing as expected."
            )));
        }

        let restored = format!("{bom}{}", restore_line_endings(&updated, ending));
        tokio::fs::write(&path, restored.as_bytes()).await?;

        let diff = generate_diff(&content, &updated, DIFF_CONTEXT_LINES);
        Ok(ToolOutput {
            content: format!(
                "Successfully replaced text in {path_arg}. Changed {} characters to {} characters.",
                old_text.len(),
                new_text.len()
            ),
            display: DisplayData::new(
                "edit_result",
                json!({
                    "diff": diff,
                    "fuzzy_matched": found.kind == MatchKind::Fuzzy,
                }),
            ),
            error: None,
        })
    }
}
