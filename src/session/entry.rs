//! The append-only session entry model.
//!
//! Entries are JSONL records forming a parent-linked tree; they are
//! created by the engine, persisted by the store, and never mutated.

use serde::{Deserialize, Serialize};

use crate::llm::Usage;

/// Entry record types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    Meta,
    SessionInfo,
    User,
    Assistant,
    ToolCall,
    ToolResult,
    Compaction,
}

impl std::fmt::Display for EntryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntryKind::Meta => write!(f, "meta"),
            EntryKind::SessionInfo => write!(f, "session_info"),
            EntryKind::User => write!(f, "user"),
            EntryKind::Assistant => write!(f, "assistant"),
            EntryKind::ToolCall => write!(f, "tool_call"),
            EntryKind::ToolResult => write!(f, "tool_result"),
            EntryKind::Compaction => write!(f, "compaction"),
        }
    }
}

/// One append-only record in a session log.
///
/// `parent_id` is empty for roots; the id chain from any entry to a root
/// is one conversation branch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    pub id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub parent_id: String,
    #[serde(rename = "type")]
    pub kind: EntryKind,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub content: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub tool_call_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
    /// Unix seconds.
    #[serde(default)]
    pub ts: i64,
}

impl Entry {
    /// A blank entry of the given kind; the engine assigns id/parent/ts on
    /// append.
    pub fn new(kind: EntryKind) -> Self {
        Self {
            id: String::new(),
            parent_id: String::new(),
            kind,
            content: String::new(),
            name: String::new(),
            tool_call_id: String::new(),
            params: None,
            data: None,
            usage: None,
            ts: 0,
        }
    }
}

/// Structured payload stored in a compaction entry's `data` field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompactionData {
    pub first_kept_entry_id: String,
    pub dropped_messages: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
}

/// `is_error` marker stored in a tool-result entry's `data` field.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolResultData {
    #[serde(default)]
    pub is_error: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&EntryKind::SessionInfo).unwrap(),
            "\"session_info\""
        );
        assert_eq!(
            serde_json::to_string(&EntryKind::ToolResult).unwrap(),
            "\"tool_result\""
        );
    }

    #[test]
    fn entry_omits_empty_fields() {
        let mut entry = Entry::new(EntryKind::User);
        entry.id = "000001".to_string();
        entry.content = "hi".to_string();
        entry.ts = 1700000000;

        let json = serde_json::to_string(&entry).unwrap();
        assert_eq!(
            json,
            r#"{"id":"000001","type":"user","content":"hi","ts":1700000000}"#
        );
    }

    #[test]
    fn entry_roundtrips_all_fields() {
        let mut entry = Entry::new(EntryKind::ToolResult);
        entry.id = "000004".to_string();
        entry.parent_id = "000003".to_string();
        entry.name = "bash".to_string();
        entry.tool_call_id = "toolu_1".to_string();
        entry.content = "output".to_string();
        entry.data = Some(serde_json::json!({"is_error": true}));
        entry.ts = 42;

        let json = serde_json::to_string(&entry).unwrap();
        let parsed: Entry = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, entry);
    }

    #[test]
    fn compaction_data_skips_absent_instructions() {
        let data = CompactionData {
            first_kept_entry_id: "000005".to_string(),
            dropped_messages: 3,
            instructions: None,
        };
        let json = serde_json::to_string(&data).unwrap();
        assert!(!json.contains("instructions"));
    }
}
