//! Session persistence and the branching session engine.

pub mod engine;
pub mod entry;
pub mod error;
pub mod store;

pub use engine::{
    CompactionResult, QueueRunner, Runner, SessionEngine, SessionEngineConfig, SessionStats,
    TreeNode,
};
pub use entry::{CompactionData, Entry, EntryKind, ToolResultData};
pub use error::{SessionError, StoreError};
pub use store::{DEFAULT_SESSIONS_DIR, SessionInfo, SessionStore};
