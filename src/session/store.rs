//! Append-only JSONL session persistence.
//!
//! One `<id>.jsonl` file per session under a configured directory, UTF-8,
//! one entry per line with a trailing newline. Files are only ever
//! appended to; loading replays every line in order.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tokio::fs::{self, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use super::entry::Entry;
use super::error::StoreError;

/// Default sessions directory relative to a project root.
pub const DEFAULT_SESSIONS_DIR: &str = ".gar/sessions";

const SESSION_FILE_EXT: &str = "jsonl";
const MAX_JSONL_LINE_BYTES: usize = 1024 * 1024;

/// One session file on disk.
#[derive(Debug, Clone)]
pub struct SessionInfo {
    pub id: String,
    pub path: PathBuf,
    pub updated_at: SystemTime,
    pub size_bytes: u64,
}

/// Persists session entries as append-only JSONL files.
#[derive(Debug)]
pub struct SessionStore {
    dir: PathBuf,
    write_lock: tokio::sync::Mutex<()>,
}

impl SessionStore {
    /// A store rooted at `dir`. The directory is created on first append.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        if dir.as_os_str().is_empty() {
            return Err(StoreError::DirRequired);
        }
        Ok(Self {
            dir,
            write_lock: tokio::sync::Mutex::new(()),
        })
    }

    /// The canonical sessions directory under a project root.
    pub fn default_dir(project_root: impl AsRef<Path>) -> PathBuf {
        project_root.as_ref().join(DEFAULT_SESSIONS_DIR)
    }

    /// Append one entry to a session file.
    pub async fn append(&self, session_id: &str, entry: &Entry) -> Result<(), StoreError> {
        let path = self.session_path(session_id)?;

        if entry.id.trim().is_empty() {
            return Err(StoreError::EntryIdRequired);
        }
        let mut entry = entry.clone();
        if entry.ts <= 0 {
            entry.ts = chrono::Utc::now().timestamp();
        }

        let mut line = serde_json::to_string(&entry).map_err(StoreError::Encode)?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;
        fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| StoreError::io(&self.dir, e))?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| StoreError::io(&path, e))?;
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| StoreError::io(&path, e))?;
        Ok(())
    }

    /// Read all entries from one session file, in append order.
    pub async fn load(&self, session_id: &str) -> Result<Vec<Entry>, StoreError> {
        let path = self.session_path(session_id)?;

        let file = match tokio::fs::File::open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::SessionNotFound(session_id.trim().to_string()));
            }
            Err(e) => return Err(StoreError::io(&path, e)),
        };

        let reader = BufReader::new(file);
        let mut lines = reader.lines();
        let mut entries = Vec::with_capacity(64);
        let mut line_num = 0usize;

        while let Some(line) = lines
            .next_line()
            .await
            .map_err(|e| StoreError::io(&path, e))?
        {
            line_num += 1;
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            if trimmed.len() > MAX_JSONL_LINE_BYTES {
                return Err(StoreError::LineTooLarge {
                    line: line_num,
                    max: MAX_JSONL_LINE_BYTES,
                });
            }
            let entry: Entry = serde_json::from_str(trimmed).map_err(|source| {
                StoreError::Decode {
                    line: line_num,
                    source,
                }
            })?;
            entries.push(entry);
        }

        Ok(entries)
    }

    /// Known session files, newest first by mtime with id tiebreak
    /// descending.
    pub async fn list(&self) -> Result<Vec<SessionInfo>, StoreError> {
        let mut dir = match fs::read_dir(&self.dir).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::io(&self.dir, e)),
        };

        let mut out = Vec::new();
        while let Some(item) = dir
            .next_entry()
            .await
            .map_err(|e| StoreError::io(&self.dir, e))?
        {
            let path = item.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(SESSION_FILE_EXT) {
                continue;
            }
            let metadata = item.metadata().await.map_err(|e| StoreError::io(&path, e))?;
            if metadata.is_dir() {
                continue;
            }
            let Some(id) = path.file_stem().and_then(|stem| stem.to_str()) else {
                continue;
            };
            out.push(SessionInfo {
                id: id.to_string(),
                path: path.clone(),
                updated_at: metadata.modified().map_err(|e| StoreError::io(&path, e))?,
                size_bytes: metadata.len(),
            });
        }

        out.sort_by(|a, b| {
            b.updated_at
                .cmp(&a.updated_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        Ok(out)
    }

    fn session_path(&self, session_id: &str) -> Result<PathBuf, StoreError> {
        let id = session_id.trim();
        if id.is_empty() {
            return Err(StoreError::SessionIdRequired);
        }
        if id.contains('/') || id.contains('\\') || id == "." || id == ".." {
            return Err(StoreError::InvalidSessionId(id.to_string()));
        }
        Ok(self.dir.join(format!("{id}.{SESSION_FILE_EXT}")))
    }
}
