//! Session store and engine errors.

use std::path::PathBuf;

use thiserror::Error;

use crate::agent::AgentError;

/// Errors from the append-only session store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("session directory is required")]
    DirRequired,

    #[error("session id is required")]
    SessionIdRequired,

    /// Ids must be usable as file names: no separators, not `.`/`..`.
    #[error("invalid session id: {0}")]
    InvalidSessionId(String),

    #[error("entry id is required")]
    EntryIdRequired,

    #[error("session not found: {0}")]
    SessionNotFound(String),

    #[error("session line {line} too large (> {max} bytes)")]
    LineTooLarge { line: usize, max: usize },

    #[error("decode session line {line}: {source}")]
    Decode {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("serialize session entry: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Errors from the session engine.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("agent session id is required")]
    SessionIdRequired,

    #[error("session store is required")]
    StoreRequired,

    #[error("runner does not support queued messages")]
    QueueUnsupported,

    #[error("branch target not found: {0}")]
    BranchTargetNotFound(String),

    #[error("compaction not needed")]
    CompactionNotNeeded,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Runner(#[from] AgentError),
}
