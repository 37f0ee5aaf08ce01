//! Name-indexed tool registry.

use std::collections::HashMap;
use std::sync::RwLock;

use serde_json::Value;
use tokio_util::sync::CancellationToken;

use super::error::ToolError;
use super::tool::{SharedTool, ToolOutput};
use crate::llm::ToolSpec;

/// Process-lifetime mapping from tool name to implementation.
///
/// Reads vastly outnumber writes, so lookups take a reader lock and the
/// resolved tool is cloned out before any await point.
#[derive(Default)]
pub struct ToolRegistry {
    tools: RwLock<HashMap<String, SharedTool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Construct a registry from an initial tool set, ignoring duplicates.
    pub fn with_tools(tools: Vec<SharedTool>) -> Self {
        let registry = Self::new();
        for tool in tools {
            let _ = registry.register(tool);
        }
        registry
    }

    /// Insert a tool under its canonical name.
    pub fn register(&self, tool: SharedTool) -> Result<(), ToolError> {
        let name = tool.name().trim().to_string();
        if name.is_empty() {
            return Err(ToolError::NameRequired);
        }

        let mut tools = self.tools.write().expect("registry lock poisoned");
        if tools.contains_key(&name) {
            return Err(ToolError::AlreadyRegistered(name));
        }
        tools.insert(name, tool);
        Ok(())
    }

    /// Resolve a registered tool by name.
    pub fn get(&self, name: &str) -> Result<SharedTool, ToolError> {
        let lookup = name.trim();
        if lookup.is_empty() {
            return Err(ToolError::NameRequired);
        }
        let tools = self.tools.read().expect("registry lock poisoned");
        tools
            .get(lookup)
            .cloned()
            .ok_or_else(|| ToolError::NotFound(lookup.to_string()))
    }

    /// Resolve and execute a named tool with raw JSON parameters.
    pub async fn execute(
        &self,
        cancel: &CancellationToken,
        name: &str,
        params: &Value,
    ) -> Result<ToolOutput, ToolError> {
        let tool = self.get(name)?;
        tool.execute(cancel, params).await
    }

    /// Specs for every registered tool, sorted by name for stable request
    /// payloads.
    pub fn specs(&self) -> Vec<ToolSpec> {
        let tools = self.tools.read().expect("registry lock poisoned");
        let mut specs: Vec<ToolSpec> = tools
            .values()
            .map(|tool| ToolSpec {
                name: tool.name().to_string(),
                description: tool.description(),
                schema: tool.schema(),
            })
            .collect();
        specs.sort_by(|a, b| a.name.cmp(&b.name));
        specs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::tool::Tool;
    use async_trait::async_trait;
    use std::sync::Arc;

    struct EchoTool {
        name: &'static str,
    }

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            self.name
        }
        fn description(&self) -> String {
            "echo".to_string()
        }
        fn schema(&self) -> Value {
            serde_json::json!({"type": "object", "properties": {}})
        }
        async fn execute(
            &self,
            _cancel: &CancellationToken,
            params: &Value,
        ) -> Result<ToolOutput, ToolError> {
            Ok(ToolOutput {
                content: params.to_string(),
                ..ToolOutput::default()
            })
        }
    }

    #[test]
    fn register_rejects_empty_name() {
        let registry = ToolRegistry::new();
        let err = registry.register(Arc::new(EchoTool { name: "  " })).unwrap_err();
        assert!(matches!(err, ToolError::NameRequired));
    }

    #[test]
    fn register_rejects_duplicates() {
        let registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool { name: "echo" })).unwrap();
        let err = registry
            .register(Arc::new(EchoTool { name: "echo" }))
            .unwrap_err();
        assert!(matches!(err, ToolError::AlreadyRegistered(name) if name == "echo"));
    }

    #[test]
    fn get_unknown_tool_fails() {
        let registry = ToolRegistry::new();
        let err = registry.get("missing").unwrap_err();
        assert!(matches!(err, ToolError::NotFound(name) if name == "missing"));
    }

    #[tokio::test]
    async fn execute_resolves_and_runs() {
        let registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool { name: "echo" })).unwrap();
        let cancel = CancellationToken::new();
        let output = registry
            .execute(&cancel, "echo", &serde_json::json!({"x": 1}))
            .await
            .unwrap();
        assert_eq!(output.content, r#"{"x":1}"#);
    }

    #[test]
    fn specs_are_sorted_by_name() {
        let registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool { name: "zeta" })).unwrap();
        registry.register(Arc::new(EchoTool { name: "alpha" })).unwrap();
        let specs = registry.specs();
        assert_eq!(specs[0].name, "alpha");
        assert_eq!(specs[1].name, "zeta");
    }
}
