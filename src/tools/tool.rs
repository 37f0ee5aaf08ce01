//! The tool contract.
//!
//! Tools are self-contained structs holding their own dependencies
//! (workspace root, output limits). Argument validation happens inside
//! `execute`, not in the registry, so unknown or extra fields degrade
//! gracefully.

use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;

use super::error::ToolError;

/// UI-facing structured tool output, opaque to the model.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DisplayData {
    pub kind: String,
    pub payload: serde_json::Value,
}

impl DisplayData {
    pub fn new(kind: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            kind: kind.into(),
            payload,
        }
    }
}

/// Tool output split for model and UI channels.
///
/// `error` carries a tool-level failure (non-zero exit, timeout) while
/// still preserving the partial `content` the model should see.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolOutput {
    pub content: String,
    pub display: DisplayData,
    pub error: Option<String>,
}

/// The canonical runtime contract for all built-in tools.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> String;
    /// JSON-Schema object describing the accepted parameters.
    fn schema(&self) -> serde_json::Value;
    /// Execute with opaque JSON parameters. Implementations must return
    /// promptly once `cancel` fires; partial results may be returned.
    async fn execute(
        &self,
        cancel: &CancellationToken,
        params: &serde_json::Value,
    ) -> Result<ToolOutput, ToolError>;
}

impl std::fmt::Debug for dyn Tool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tool").field("name", &self.name()).finish()
    }
}

/// Shared tool reference.
pub type SharedTool = Arc<dyn Tool>;

/// Decode tool parameters, treating null as an empty object.
pub(crate) fn decode_params<T: DeserializeOwned>(params: &serde_json::Value) -> Result<T, ToolError> {
    let value = if params.is_null() {
        serde_json::Value::Object(serde_json::Map::new())
    } else {
        params.clone()
    };
    serde_json::from_value(value).map_err(|e| ToolError::InvalidParams(e.to_string()))
}

/// Bail out early when cancellation has already been requested.
pub(crate) fn check_cancelled(cancel: &CancellationToken) -> Result<(), ToolError> {
    if cancel.is_cancelled() {
        return Err(ToolError::Cancelled);
    }
    Ok(())
}
