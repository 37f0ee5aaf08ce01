//! The session engine: entry DAG, conversation context, compaction, and
//! branch/session switching.
//!
//! One mutex covers all mutable state (entries, indexes, leaf pointer,
//! conversation, buffers, queue mirrors). Store appends happen under the
//! lock (disk-bound); provider runs never do.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::entry::{CompactionData, Entry, EntryKind, ToolResultData};
use super::error::{SessionError, StoreError};
use super::store::{SessionInfo, SessionStore};
use crate::agent::{Agent, AgentError};
use crate::llm::types::{Event, Message, Request, Role, ToolResult, ToolSpec, Usage};
use crate::llm::EventReceiver;

const DEFAULT_AUTO_COMPACT_MESSAGES: usize = 80;
const DEFAULT_COMPACTION_KEEP: usize = 24;
const COMPACTION_SUMMARY_MAX_LINES: usize = 40;
const COMPACTION_SUMMARY_MAX_CHARS: usize = 6000;
const SUMMARY_SNIPPET_MAX_RUNES: usize = 180;

// ============================================================================
// Runner Contracts
// ============================================================================

/// Executes one LLM request as an event stream.
#[async_trait]
pub trait Runner: Send + Sync {
    async fn run(&self, req: Request) -> Result<EventReceiver, AgentError>;
}

/// Optional queue control contract (steer / follow-up).
pub trait QueueRunner: Send + Sync {
    fn steer(&self, msg: Message);
    fn follow_up(&self, msg: Message);
    fn clear_all_queues(&self);
}

#[async_trait]
impl Runner for Agent {
    async fn run(&self, req: Request) -> Result<EventReceiver, AgentError> {
        Agent::run(self, req)
    }
}

impl QueueRunner for Agent {
    fn steer(&self, msg: Message) {
        Agent::steer(self, msg);
    }
    fn follow_up(&self, msg: Message) {
        Agent::follow_up(self, msg);
    }
    fn clear_all_queues(&self) {
        Agent::clear_all_queues(self);
    }
}

// ============================================================================
// Configuration and Results
// ============================================================================

/// Configures one [`SessionEngine`].
pub struct SessionEngineConfig {
    pub runner: Arc<dyn Runner>,
    /// Queue controls when the runner supports them. For an [`Agent`] pass
    /// the same `Arc` twice.
    pub queue_runner: Option<Arc<dyn QueueRunner>>,
    pub store: Option<Arc<SessionStore>>,
    pub session_id: String,
    pub model: String,
    pub max_tokens: u32,
    pub tools: Vec<ToolSpec>,
    /// Appended as one `meta` entry to every fresh session.
    pub meta: Option<serde_json::Value>,
    /// Zero selects the default of 80.
    pub auto_compact_messages: usize,
    /// Zero selects the default of 24.
    pub compaction_keep: usize,
}

/// Reports one compaction run.
#[derive(Debug, Clone)]
pub struct CompactionResult {
    pub summary: String,
    pub dropped_messages: usize,
    pub first_kept_entry: String,
}

/// Session counters.
#[derive(Debug, Clone, Default)]
pub struct SessionStats {
    pub session_id: String,
    pub session_name: String,
    pub leaf_id: String,
    pub entry_count: usize,
    pub user_messages: usize,
    pub assistant_messages: usize,
    pub tool_calls: usize,
    pub tool_results: usize,
    pub steering_queued: usize,
    pub follow_up_queued: usize,
    pub conversation_len: usize,
}

/// One node in the session entry tree.
#[derive(Debug, Clone)]
pub struct TreeNode {
    pub entry: Entry,
    pub children: Vec<TreeNode>,
}

// ============================================================================
// Engine
// ============================================================================

struct EngineState {
    session_id: String,
    entries: Vec<Entry>,
    by_id: HashMap<String, Entry>,
    leaf_id: String,
    next_entry_id: u64,
    conversation: Vec<Message>,
    assistant_buffer: String,
    latest_usage: Option<Usage>,
    steering_queued: Vec<String>,
    follow_up_queued: Vec<String>,
    session_name: String,
}

impl std::fmt::Debug for SessionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionEngine").finish_non_exhaustive()
    }
}

/// The core coding-agent session abstraction.
pub struct SessionEngine {
    runner: Arc<dyn Runner>,
    queue_runner: Option<Arc<dyn QueueRunner>>,
    store: Option<Arc<SessionStore>>,
    model: String,
    max_tokens: u32,
    tools: Vec<ToolSpec>,
    base_meta: Option<serde_json::Value>,
    auto_compact_messages: usize,
    compaction_keep: usize,
    state: Mutex<EngineState>,
}

impl SessionEngine {
    /// Construct an engine, loading any existing entries for the session.
    pub async fn new(config: SessionEngineConfig) -> Result<Self, SessionError> {
        let session_id = config.session_id.trim().to_string();
        if session_id.is_empty() {
            return Err(SessionError::SessionIdRequired);
        }

        let mut entries = Vec::new();
        if let Some(store) = &config.store {
            match store.load(&session_id).await {
                Ok(loaded) => entries = loaded,
                Err(StoreError::SessionNotFound(_)) => {}
                Err(err) => return Err(err.into()),
            }
        }

        let engine = Self {
            runner: config.runner,
            queue_runner: config.queue_runner,
            store: config.store,
            model: config.model.trim().to_string(),
            max_tokens: config.max_tokens,
            tools: config.tools,
            base_meta: config.meta,
            auto_compact_messages: if config.auto_compact_messages == 0 {
                DEFAULT_AUTO_COMPACT_MESSAGES
            } else {
                config.auto_compact_messages
            },
            compaction_keep: if config.compaction_keep == 0 {
                DEFAULT_COMPACTION_KEEP
            } else {
                config.compaction_keep
            },
            state: Mutex::new(EngineState {
                session_id,
                entries,
                by_id: HashMap::new(),
                leaf_id: String::new(),
                next_entry_id: 1,
                conversation: Vec::new(),
                assistant_buffer: String::new(),
                latest_usage: None,
                steering_queued: Vec::new(),
                follow_up_queued: Vec::new(),
                session_name: String::new(),
            }),
        };

        {
            let mut state = engine.state.lock().await;
            reindex(&mut state);
            state.conversation = rebuild_conversation(&state);
            if state.entries.is_empty() && engine.base_meta.is_some() {
                let mut entry = Entry::new(EntryKind::Meta);
                entry.data = engine.base_meta.clone();
                engine.append_entry(&mut state, entry).await?;
            }
        }

        Ok(engine)
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub async fn session_id(&self) -> String {
        self.state.lock().await.session_id.clone()
    }

    pub async fn leaf_id(&self) -> String {
        self.state.lock().await.leaf_id.clone()
    }

    pub async fn session_name(&self) -> String {
        self.state.lock().await.session_name.clone()
    }

    /// The current conversation context.
    pub async fn messages(&self) -> Vec<Message> {
        self.state.lock().await.conversation.clone()
    }

    /// All known session entries.
    pub async fn entries(&self) -> Vec<Entry> {
        self.state.lock().await.entries.clone()
    }

    pub async fn stats(&self) -> SessionStats {
        let state = self.state.lock().await;
        let mut stats = SessionStats {
            session_id: state.session_id.clone(),
            session_name: state.session_name.clone(),
            leaf_id: state.leaf_id.clone(),
            entry_count: state.entries.len(),
            steering_queued: state.steering_queued.len(),
            follow_up_queued: state.follow_up_queued.len(),
            conversation_len: state.conversation.len(),
            ..SessionStats::default()
        };
        for entry in &state.entries {
            match entry.kind {
                EntryKind::User => stats.user_messages += 1,
                EntryKind::Assistant => stats.assistant_messages += 1,
                EntryKind::ToolCall => stats.tool_calls += 1,
                EntryKind::ToolResult => stats.tool_results += 1,
                _ => {}
            }
        }
        stats
    }

    // ========================================================================
    // Session Management
    // ========================================================================

    /// Append one metadata entry.
    pub async fn append_meta(&self, data: serde_json::Value) -> Result<(), SessionError> {
        let mut state = self.state.lock().await;
        let mut entry = Entry::new(EntryKind::Meta);
        entry.data = Some(data);
        self.append_entry(&mut state, entry).await
    }

    /// Store one display-name entry and update in-memory state.
    pub async fn set_session_name(&self, name: &str) -> Result<(), SessionError> {
        let mut state = self.state.lock().await;
        let trimmed = name.trim().to_string();
        let mut entry = Entry::new(EntryKind::SessionInfo);
        entry.name = trimmed.clone();
        self.append_entry(&mut state, entry).await?;
        state.session_name = trimmed;
        Ok(())
    }

    /// Persisted sessions, newest first.
    pub async fn list_sessions(&self) -> Result<Vec<SessionInfo>, SessionError> {
        let Some(store) = &self.store else {
            return Err(SessionError::StoreRequired);
        };
        Ok(store.list().await?)
    }

    /// Load another session into the current runtime. An absent session
    /// starts empty.
    pub async fn switch_session(&self, session_id: &str) -> Result<(), SessionError> {
        let Some(store) = &self.store else {
            return Err(SessionError::StoreRequired);
        };
        let target = session_id.trim().to_string();
        if target.is_empty() {
            return Err(SessionError::SessionIdRequired);
        }

        let loaded = match store.load(&target).await {
            Ok(entries) => entries,
            Err(StoreError::SessionNotFound(_)) => Vec::new(),
            Err(err) => return Err(err.into()),
        };

        let mut state = self.state.lock().await;
        self.install_session(&mut state, target, loaded);
        Ok(())
    }

    /// Reset to a fresh logical session. An empty id generates a
    /// `YYYYMMDD-HHMMSS` id, suffixed on collision.
    pub async fn new_session(&self, requested_id: &str) -> Result<String, SessionError> {
        let mut id = requested_id.trim().to_string();
        if id.is_empty() {
            id = self.generate_session_id().await;
        }

        let mut state = self.state.lock().await;
        self.install_session(&mut state, id, Vec::new());
        if self.base_meta.is_some() {
            let mut entry = Entry::new(EntryKind::Meta);
            entry.data = self.base_meta.clone();
            self.append_entry(&mut state, entry).await?;
        }
        Ok(state.session_id.clone())
    }

    // ========================================================================
    // Running
    // ========================================================================

    /// Append a user message and start one run. Blank input is a no-op.
    pub async fn submit(&self, text: &str) -> Result<Option<EventReceiver>, SessionError> {
        let content = text.trim().to_string();
        if content.is_empty() {
            return Ok(None);
        }

        let req = {
            let mut state = self.state.lock().await;
            self.append_user(&mut state, &content).await?;
            match self
                .compact_locked(
                    &mut state,
                    self.auto_compact_messages,
                    self.compaction_keep,
                    "",
                )
                .await
            {
                Ok(_) | Err(SessionError::CompactionNotNeeded) => {}
                Err(err) => return Err(err),
            }
            self.build_request(&state)
        };

        Ok(Some(self.runner.run(req).await?))
    }

    /// Start one run without appending a new user message.
    pub async fn run(&self) -> Result<EventReceiver, SessionError> {
        let req = {
            let mut state = self.state.lock().await;
            match self
                .compact_locked(
                    &mut state,
                    self.auto_compact_messages,
                    self.compaction_keep,
                    "",
                )
                .await
            {
                Ok(_) | Err(SessionError::CompactionNotNeeded) => {}
                Err(err) => return Err(err),
            }
            self.build_request(&state)
        };
        Ok(self.runner.run(req).await?)
    }

    // ========================================================================
    // Queues
    // ========================================================================

    /// Queue a high-priority user message. Blank input is a no-op.
    pub async fn queue_steer(&self, text: &str) -> Result<(), SessionError> {
        let content = text.trim().to_string();
        if content.is_empty() {
            return Ok(());
        }
        let mut state = self.state.lock().await;
        let Some(queue_runner) = &self.queue_runner else {
            return Err(SessionError::QueueUnsupported);
        };
        state.steering_queued.push(content.clone());
        queue_runner.steer(Message::user(content));
        Ok(())
    }

    /// Queue a low-priority user message. Blank input is a no-op.
    pub async fn queue_follow_up(&self, text: &str) -> Result<(), SessionError> {
        let content = text.trim().to_string();
        if content.is_empty() {
            return Ok(());
        }
        let mut state = self.state.lock().await;
        let Some(queue_runner) = &self.queue_runner else {
            return Err(SessionError::QueueUnsupported);
        };
        state.follow_up_queued.push(content.clone());
        queue_runner.follow_up(Message::user(content));
        Ok(())
    }

    pub async fn steering_queued(&self) -> Vec<String> {
        self.state.lock().await.steering_queued.clone()
    }

    pub async fn follow_up_queued(&self) -> Vec<String> {
        self.state.lock().await.follow_up_queued.clone()
    }

    /// Clear queued messages, returning what was dropped.
    pub async fn clear_queue(&self) -> (Vec<String>, Vec<String>) {
        let mut state = self.state.lock().await;
        let steering = std::mem::take(&mut state.steering_queued);
        let follow_up = std::mem::take(&mut state.follow_up_queued);
        if let Some(queue_runner) = &self.queue_runner {
            queue_runner.clear_all_queues();
        }
        (steering, follow_up)
    }

    // ========================================================================
    // Event Recording
    // ========================================================================

    /// Consume one stream event and update session state.
    pub async fn record_event(&self, event: &Event) -> Result<(), SessionError> {
        let mut state = self.state.lock().await;

        match event {
            Event::QueuedMessage(msg) => {
                if msg.role != Role::User {
                    return Ok(());
                }
                let text = msg.text();
                if text.is_empty() {
                    return Ok(());
                }
                dequeue_delivered(&mut state, &text);
                self.append_user(&mut state, &text).await
            }
            Event::ContentBlockStart(start) => {
                if start.block_type == "text" {
                    if let Some(text) = &start.text {
                        state.assistant_buffer.push_str(text);
                    }
                }
                Ok(())
            }
            Event::TextDelta(delta) => {
                state.assistant_buffer.push_str(delta);
                Ok(())
            }
            Event::ToolCallStart(call) => {
                let mut entry = Entry::new(EntryKind::ToolCall);
                entry.name = call.name.clone();
                entry.params = Some(call.arguments.clone());
                self.append_entry(&mut state, entry).await
            }
            Event::ToolResult(result) => {
                state.conversation.push(Message::tool_result(ToolResult {
                    tool_call_id: result.tool_call_id.clone(),
                    tool_name: result.tool_name.clone(),
                    content: result.content.clone(),
                    is_error: result.is_error,
                }));
                let mut entry = Entry::new(EntryKind::ToolResult);
                entry.tool_call_id = result.tool_call_id.clone();
                entry.name = result.tool_name.clone();
                entry.content = result.content.clone();
                entry.data = Some(
                    serde_json::to_value(ToolResultData {
                        is_error: result.is_error,
                    })
                    .expect("tool result data serializes"),
                );
                self.append_entry(&mut state, entry).await
            }
            Event::Usage(usage) => {
                state.latest_usage = Some(usage.clone());
                Ok(())
            }
            Event::Done(_) | Event::Error { .. } => self.flush_assistant(&mut state).await,
            _ => Ok(()),
        }
    }

    /// Flush any buffered assistant text as one entry.
    pub async fn finalize(&self) -> Result<(), SessionError> {
        let mut state = self.state.lock().await;
        self.flush_assistant(&mut state).await
    }

    // ========================================================================
    // Compaction and Branching
    // ========================================================================

    /// Manual compaction keeping the newest `keep` conversation messages.
    /// Zero selects the configured default.
    pub async fn compact(
        &self,
        keep: usize,
        instructions: &str,
    ) -> Result<CompactionResult, SessionError> {
        let mut state = self.state.lock().await;
        let keep = if keep == 0 { self.compaction_keep } else { keep };
        self.compact_locked(&mut state, 0, keep, instructions).await
    }

    /// Move the leaf pointer and rebuild the conversation context. An
    /// empty target resets to an empty branch.
    pub async fn switch_branch(&self, target_id: &str) -> Result<(), SessionError> {
        let target = target_id.trim().to_string();
        let mut state = self.state.lock().await;

        if target.is_empty() {
            state.leaf_id = String::new();
            state.conversation = Vec::new();
            state.assistant_buffer.clear();
            state.latest_usage = None;
            return Ok(());
        }
        if !state.by_id.contains_key(&target) {
            return Err(SessionError::BranchTargetNotFound(target));
        }
        state.leaf_id = target;
        state.conversation = rebuild_conversation(&state);
        state.assistant_buffer.clear();
        state.latest_usage = None;
        Ok(())
    }

    /// The current session entry tree.
    pub async fn tree(&self) -> Vec<TreeNode> {
        let state = self.state.lock().await;
        build_tree(&state.entries, &state.by_id)
    }

    /// The tree rendered for display, leaf marked with `*`.
    pub async fn tree_lines(&self) -> Vec<String> {
        let state = self.state.lock().await;
        let roots = build_tree(&state.entries, &state.by_id);
        if roots.is_empty() {
            return Vec::new();
        }

        let mut lines = Vec::with_capacity(state.entries.len());
        fn walk(node: &TreeNode, depth: usize, leaf_id: &str, lines: &mut Vec<String>) {
            let indent = "  ".repeat(depth);
            let marker = if node.entry.id == leaf_id { "*" } else { " " };
            lines.push(format!(
                "{marker} {indent}{} {}",
                node.entry.id,
                entry_preview(&node.entry)
            ));
            for child in &node.children {
                walk(child, depth + 1, leaf_id, lines);
            }
        }
        for root in &roots {
            walk(root, 0, &state.leaf_id, &mut lines);
        }
        lines
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn build_request(&self, state: &EngineState) -> Request {
        Request {
            model: self.model.clone(),
            messages: state.conversation.clone(),
            tools: self.tools.clone(),
            max_tokens: self.max_tokens,
            ..Request::default()
        }
    }

    async fn append_user(&self, state: &mut EngineState, content: &str) -> Result<(), SessionError> {
        state.conversation.push(Message::user(content));
        let mut entry = Entry::new(EntryKind::User);
        entry.content = content.to_string();
        self.append_entry(state, entry).await
    }

    async fn flush_assistant(&self, state: &mut EngineState) -> Result<(), SessionError> {
        let text = state.assistant_buffer.trim().to_string();
        if text.is_empty() {
            return Ok(());
        }

        let mut entry = Entry::new(EntryKind::Assistant);
        entry.content = text.clone();
        entry.usage = state.latest_usage.clone();

        state.conversation.push(Message::assistant(text));
        self.append_entry(state, entry).await?;

        state.assistant_buffer.clear();
        state.latest_usage = None;
        Ok(())
    }

    async fn compact_locked(
        &self,
        state: &mut EngineState,
        threshold: usize,
        keep: usize,
        instructions: &str,
    ) -> Result<CompactionResult, SessionError> {
        if threshold > 0 && state.conversation.len() <= threshold {
            return Err(SessionError::CompactionNotNeeded);
        }
        let keep = if keep == 0 { self.compaction_keep } else { keep };

        // Only entries still contributing to the context count; everything
        // a previous compaction already replaced stays replaced, so an
        // immediate re-run with the same keep is a no-op.
        let message_entries = effective_message_entries(state);
        if message_entries.len() <= keep {
            return Err(SessionError::CompactionNotNeeded);
        }

        let split = message_entries.len() - keep;
        let first_kept_id = message_entries[split].id.clone();
        let dropped: Vec<Entry> = message_entries[..split].to_vec();
        let summary = build_compaction_summary(&dropped, instructions);

        let instructions = instructions.trim();
        let data = CompactionData {
            first_kept_entry_id: first_kept_id.clone(),
            dropped_messages: dropped.len(),
            instructions: if instructions.is_empty() {
                None
            } else {
                Some(instructions.to_string())
            },
        };

        let mut entry = Entry::new(EntryKind::Compaction);
        entry.content = summary.clone();
        entry.data = Some(serde_json::to_value(&data).expect("compaction data serializes"));
        self.append_entry(state, entry).await?;

        state.conversation = rebuild_conversation(state);
        Ok(CompactionResult {
            summary,
            dropped_messages: dropped.len(),
            first_kept_entry: first_kept_id,
        })
    }

    /// Assign id/parent/ts, persist, then advance in-memory state. A
    /// failed store append leaves the state untouched.
    async fn append_entry(
        &self,
        state: &mut EngineState,
        mut entry: Entry,
    ) -> Result<(), SessionError> {
        entry.id = format!("{:06}", state.next_entry_id);
        entry.parent_id = state.leaf_id.clone();
        if entry.ts <= 0 {
            entry.ts = chrono::Utc::now().timestamp();
        }

        if let Some(store) = &self.store {
            store.append(&state.session_id, &entry).await?;
        }

        state.by_id.insert(entry.id.clone(), entry.clone());
        state.leaf_id = entry.id.clone();
        state.entries.push(entry);
        state.next_entry_id += 1;
        Ok(())
    }

    fn install_session(&self, state: &mut EngineState, session_id: String, entries: Vec<Entry>) {
        state.session_id = session_id.trim().to_string();
        state.entries = entries;
        reindex(state);
        state.conversation = rebuild_conversation(state);
        state.assistant_buffer.clear();
        state.latest_usage = None;
        state.steering_queued.clear();
        state.follow_up_queued.clear();
        if let Some(queue_runner) = &self.queue_runner {
            queue_runner.clear_all_queues();
        }
    }

    async fn generate_session_id(&self) -> String {
        let base = chrono::Utc::now().format("%Y%m%d-%H%M%S").to_string();
        let Some(store) = &self.store else {
            return base;
        };
        let Ok(infos) = store.list().await else {
            return base;
        };
        if infos.is_empty() {
            return base;
        }

        let used: HashSet<String> = infos.iter().map(|info| info.id.trim().to_string()).collect();
        if !used.contains(&base) {
            return base;
        }
        for i in 1..10_000 {
            let candidate = format!("{base}-{i}");
            if !used.contains(&candidate) {
                return candidate;
            }
        }
        format!(
            "{base}-{}",
            chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default()
        )
    }
}

// ============================================================================
// Free Helpers
// ============================================================================

fn reindex(state: &mut EngineState) {
    state.by_id = HashMap::with_capacity(state.entries.len());
    state.leaf_id = String::new();
    state.session_name = String::new();
    let mut max_numeric_id = 0u64;
    for entry in &state.entries {
        state.by_id.insert(entry.id.clone(), entry.clone());
        state.leaf_id = entry.id.clone();
        if entry.kind == EntryKind::SessionInfo {
            state.session_name = entry.name.trim().to_string();
        }
        if let Ok(parsed) = entry.id.parse::<u64>() {
            max_numeric_id = max_numeric_id.max(parsed);
        }
    }
    if max_numeric_id == 0 {
        max_numeric_id = state.entries.len() as u64;
    }
    state.next_entry_id = max_numeric_id + 1;
}

/// The id chain from `leaf_id` up to a root, in chronological order.
fn branch_entries(state: &EngineState, leaf_id: &str) -> Vec<Entry> {
    let leaf = leaf_id.trim();
    if leaf.is_empty() {
        return Vec::new();
    }

    let mut path = Vec::with_capacity(state.entries.len());
    let mut current = leaf.to_string();
    let mut visited: HashSet<String> = HashSet::with_capacity(state.entries.len());

    while !current.is_empty() {
        if !visited.insert(current.clone()) {
            break;
        }
        let Some(entry) = state.by_id.get(&current) else {
            break;
        };
        path.push(entry.clone());
        current = entry.parent_id.trim().to_string();
    }

    path.reverse();
    path
}

/// Rebuild the conversation from the current branch, substituting the
/// latest compaction summary for everything it replaced.
fn rebuild_conversation(state: &EngineState) -> Vec<Message> {
    let branch = branch_entries(state, &state.leaf_id);
    if branch.is_empty() {
        return Vec::new();
    }

    let mut latest_compaction: Option<usize> = None;
    let mut first_kept_id = String::new();
    let mut compaction_summary = String::new();
    for (i, entry) in branch.iter().enumerate() {
        if entry.kind != EntryKind::Compaction {
            continue;
        }
        latest_compaction = Some(i);
        first_kept_id = compaction_first_kept_id(entry);
        compaction_summary = entry.content.trim().to_string();
    }

    let mut messages = Vec::with_capacity(branch.len());
    let Some(compaction_index) = latest_compaction else {
        for entry in &branch {
            if let Some(msg) = entry_to_message(entry) {
                messages.push(msg);
            }
        }
        return messages;
    };

    if !compaction_summary.is_empty() {
        messages.push(Message::assistant(compaction_summary));
    }

    let mut start = compaction_index;
    if !first_kept_id.is_empty() {
        for (i, entry) in branch.iter().enumerate().take(compaction_index) {
            if entry.id == first_kept_id {
                start = i;
                break;
            }
        }
    }
    for entry in &branch[start..compaction_index] {
        if let Some(msg) = entry_to_message(entry) {
            messages.push(msg);
        }
    }
    for entry in &branch[compaction_index + 1..] {
        if let Some(msg) = entry_to_message(entry) {
            messages.push(msg);
        }
    }

    messages
}

fn compaction_first_kept_id(entry: &Entry) -> String {
    let Some(data) = &entry.data else {
        return String::new();
    };
    match serde_json::from_value::<CompactionData>(data.clone()) {
        Ok(payload) => payload.first_kept_entry_id.trim().to_string(),
        Err(_) => String::new(),
    }
}

fn entry_to_message(entry: &Entry) -> Option<Message> {
    match entry.kind {
        EntryKind::User => {
            let text = entry.content.trim();
            if text.is_empty() {
                return None;
            }
            Some(Message::user(text))
        }
        EntryKind::Assistant => {
            let text = entry.content.trim();
            if text.is_empty() {
                return None;
            }
            Some(Message::assistant(text))
        }
        EntryKind::ToolResult => {
            let is_error = entry
                .data
                .as_ref()
                .and_then(|data| serde_json::from_value::<ToolResultData>(data.clone()).ok())
                .map(|data| data.is_error)
                .unwrap_or(false);
            Some(Message::tool_result(ToolResult {
                tool_call_id: entry.tool_call_id.clone(),
                tool_name: entry.name.clone(),
                content: entry.content.clone(),
                is_error,
            }))
        }
        _ => None,
    }
}

fn is_message_entry(kind: EntryKind) -> bool {
    matches!(
        kind,
        EntryKind::User | EntryKind::Assistant | EntryKind::ToolResult
    )
}

/// Message entries still contributing to the conversation: the tail the
/// latest compaction kept, plus everything appended after it.
fn effective_message_entries(state: &EngineState) -> Vec<Entry> {
    let branch = branch_entries(state, &state.leaf_id);

    let mut latest_compaction: Option<usize> = None;
    let mut first_kept_id = String::new();
    for (i, entry) in branch.iter().enumerate() {
        if entry.kind == EntryKind::Compaction {
            latest_compaction = Some(i);
            first_kept_id = compaction_first_kept_id(entry);
        }
    }

    let Some(compaction_index) = latest_compaction else {
        return branch
            .into_iter()
            .filter(|entry| is_message_entry(entry.kind))
            .collect();
    };

    let mut start = compaction_index;
    if !first_kept_id.is_empty() {
        for (i, entry) in branch.iter().enumerate().take(compaction_index) {
            if entry.id == first_kept_id {
                start = i;
                break;
            }
        }
    }

    let mut out: Vec<Entry> = Vec::new();
    for entry in &branch[start..compaction_index] {
        if is_message_entry(entry.kind) {
            out.push(entry.clone());
        }
    }
    for entry in &branch[compaction_index + 1..] {
        if is_message_entry(entry.kind) {
            out.push(entry.clone());
        }
    }
    out
}

fn dequeue_delivered(state: &mut EngineState, text: &str) {
    if let Some(pos) = state.steering_queued.iter().position(|queued| queued == text) {
        state.steering_queued.remove(pos);
        return;
    }
    if let Some(pos) = state.follow_up_queued.iter().position(|queued| queued == text) {
        state.follow_up_queued.remove(pos);
    }
}

fn build_compaction_summary(dropped: &[Entry], instructions: &str) -> String {
    let mut lines = Vec::with_capacity(dropped.len() + 3);
    lines.push("[Context Compact Summary]".to_string());
    let instructions = instructions.trim();
    if !instructions.is_empty() {
        lines.push(format!("Instructions: {instructions}"));
    }
    lines.push("Earlier conversation highlights:".to_string());

    let mut count = 0usize;
    for entry in dropped {
        let mut role = entry.kind.to_string();
        let mut text = entry.content.trim().to_string();
        if entry.kind == EntryKind::ToolResult {
            if !entry.name.trim().is_empty() {
                role = format!("tool:{}", entry.name.trim());
            }
            if text.is_empty() {
                text = "(empty tool result)".to_string();
            }
        }
        if text.is_empty() {
            continue;
        }
        lines.push(format!(
            "- {role}: {}",
            truncate_runes(&text, SUMMARY_SNIPPET_MAX_RUNES)
        ));
        count += 1;
        if count >= COMPACTION_SUMMARY_MAX_LINES {
            break;
        }
    }
    if count == 0 {
        lines.push("- (no textual messages)".to_string());
    }

    let summary = lines.join("\n");
    if summary.chars().count() > COMPACTION_SUMMARY_MAX_CHARS {
        summary.chars().take(COMPACTION_SUMMARY_MAX_CHARS).collect()
    } else {
        summary
    }
}

fn build_tree(entries: &[Entry], by_id: &HashMap<String, Entry>) -> Vec<TreeNode> {
    if entries.is_empty() {
        return Vec::new();
    }

    let mut children: HashMap<String, Vec<String>> = HashMap::with_capacity(entries.len());
    let mut roots: Vec<String> = Vec::new();
    for entry in entries {
        let parent = entry.parent_id.trim();
        if parent.is_empty() || !by_id.contains_key(parent) {
            roots.push(entry.id.clone());
            continue;
        }
        children
            .entry(parent.to_string())
            .or_default()
            .push(entry.id.clone());
    }

    fn visit(
        id: &str,
        by_id: &HashMap<String, Entry>,
        children: &HashMap<String, Vec<String>>,
    ) -> TreeNode {
        let entry = by_id.get(id).cloned().expect("tree ids are indexed");
        let mut node = TreeNode {
            entry,
            children: Vec::new(),
        };
        if let Some(child_ids) = children.get(id) {
            for child_id in child_ids {
                node.children.push(visit(child_id, by_id, children));
            }
        }
        node
    }

    roots
        .iter()
        .map(|root| visit(root, by_id, &children))
        .collect()
}

fn entry_preview(entry: &Entry) -> String {
    let type_name = entry.kind.to_string();
    let snippet = match entry.kind {
        EntryKind::User | EntryKind::Assistant | EntryKind::Compaction => {
            entry.content.trim().to_string()
        }
        EntryKind::SessionInfo => entry.name.trim().to_string(),
        EntryKind::ToolCall | EntryKind::ToolResult => {
            let name = entry.name.trim();
            if name.is_empty() {
                entry.content.trim().to_string()
            } else {
                name.to_string()
            }
        }
        _ => String::new(),
    };
    if snippet.is_empty() {
        return type_name;
    }
    format!("{type_name} {}", truncate_runes(&snippet, 48))
}

fn truncate_runes(text: &str, max: usize) -> String {
    if max == 0 {
        return String::new();
    }
    let count = text.chars().count();
    if count <= max {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max).collect();
    out.push_str("...");
    out
}
