//! Built-in tools, the tool contract, and the name-indexed registry.

pub mod bash;
pub mod diff;
pub mod edit;
pub mod error;
pub mod find;
pub mod glob;
pub mod grep;
pub mod ls;
pub mod read;
pub mod registry;
pub mod tool;
pub mod truncate;
pub mod workspace;
pub mod write;

use std::sync::Arc;

pub use bash::BashTool;
pub use edit::EditTool;
pub use error::ToolError;
pub use find::FindTool;
pub use grep::GrepTool;
pub use ls::LsTool;
pub use read::ReadTool;
pub use registry::ToolRegistry;
pub use tool::{DisplayData, SharedTool, Tool, ToolOutput};
pub use workspace::Workspace;
pub use write::WriteTool;

/// The default coding tool set.
pub fn coding_tools(workspace: Workspace) -> Vec<SharedTool> {
    vec![
        Arc::new(ReadTool::new(workspace.clone())),
        Arc::new(BashTool::new()),
        Arc::new(EditTool::new(workspace.clone())),
        Arc::new(WriteTool::new(workspace)),
    ]
}

/// The read-only exploration tool set.
pub fn read_only_tools(workspace: Workspace) -> Vec<SharedTool> {
    vec![
        Arc::new(ReadTool::new(workspace.clone())),
        Arc::new(GrepTool::new(workspace.clone())),
        Arc::new(FindTool::new(workspace.clone())),
        Arc::new(LsTool::new(workspace)),
    ]
}

/// All available built-in tools.
pub fn all_tools(workspace: Workspace) -> Vec<SharedTool> {
    vec![
        Arc::new(ReadTool::new(workspace.clone())),
        Arc::new(BashTool::new()),
        Arc::new(EditTool::new(workspace.clone())),
        Arc::new(WriteTool::new(workspace.clone())),
        Arc::new(GrepTool::new(workspace.clone())),
        Arc::new(FindTool::new(workspace.clone())),
        Arc::new(LsTool::new(workspace)),
    ]
}
