//! The write tool.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

use super::error::ToolError;
use super::tool::{DisplayData, Tool, ToolOutput, check_cancelled, decode_params};
use super::workspace::Workspace;

const WRITE_TOOL_NAME: &str = "write";

/// Writes whole-file content, creating parent directories as needed.
pub struct WriteTool {
    workspace: Workspace,
}

impl WriteTool {
    pub fn new(workspace: Workspace) -> Self {
        Self { workspace }
    }
}

#[derive(Deserialize)]
struct WriteParams {
    #[serde(default)]
    #[allow(dead_code)]
    label: Option<String>,
    #[serde(default)]
    path: String,
    #[serde(default)]
    content: String,
}

#[async_trait]
impl Tool for WriteTool {
    fn name(&self) -> &str {
        WRITE_TOOL_NAME
    }

    fn description(&self) -> String {
        "Write content to a file. Creates the file if it doesn't exist, overwrites if it does. Automatically creates parent directories.".to_string()
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "label": {"type": "string", "description": "Brief description of what you're writing (shown to user)"},
                "path": {"type": "string", "description": "Path to the file to write (relative or absolute)"},
                "content": {"type": "string", "description": "Content to write to the file"}
            },
            "required": ["path", "content"]
        })
    }

    async fn execute(
        &self,
        cancel: &CancellationToken,
        params: &Value,
    ) -> Result<ToolOutput, ToolError> {
        check_cancelled(cancel)?;
        let input: WriteParams = decode_params(params)?;
        let path_arg = input.path.trim().to_string();
        if path_arg.is_empty() {
            return Err(ToolError::InvalidParams("path is required".to_string()));
        }

        let path = self.workspace.resolve(&path_arg, true)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, input.content.as_bytes()).await?;

        let written = input.content.len();
        Ok(ToolOutput {
            content: format!("Successfully wrote {written} bytes to {path_arg}"),
            display: DisplayData::new(
                "write_result",
                json!({"path": path_arg, "bytes": written}),
            ),
            error: None,
        })
    }
}
