//! Session-keyed document storage.
//!
//! Default layout (one directory per session):
//! ```text
//! data_root/
//! └── <session_id>/
//!     ├── syllabus.json
//!     ├── playlist.json
//!     ├── <topic_key>.json
//!     └── transcripts.jsonl
//! ```

use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use serde_json::Value;
use tokio::{fs, io::AsyncWriteExt};

use crate::{
    error::{KairosError, Result},
    session::SessionId,
};

/// Key of the syllabus document. Never treated as a topic document.
pub const SYLLABUS_KEY: &str = "syllabus";
/// Key of the append-only transcript log.
pub const TRANSCRIPT_LOG_KEY: &str = "transcripts";
/// Key of the document recording the playlist a session fills.
pub const PLAYLIST_KEY: &str = "playlist";

const DOCUMENT_EXT: &str = "json";
const LOG_EXT: &str = "jsonl";

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Write (overwrite) a document.
    async fn put(&self, session: &SessionId, key: &str, document: &Value) -> Result<()>;

    /// Read a document, `None` if it was never written.
    async fn get(&self, session: &SessionId, key: &str) -> Result<Option<Value>>;

    /// Document keys of a session in listing order. Logs are not documents.
    async fn list_keys(&self, session: &SessionId) -> Result<Vec<String>>;

    /// Names of every session-like entry under the root, unvalidated.
    async fn list_sessions(&self) -> Result<Vec<String>>;

    /// Append one record to a log.
    async fn append(&self, session: &SessionId, key: &str, record: &Value) -> Result<()>;

    /// Read back every record of a log, in append order.
    async fn read_log(&self, session: &SessionId, key: &str) -> Result<Vec<Value>>;

    /// Human-readable locator for a session.
    fn location(&self, session: &SessionId) -> String;
}

pub struct DirSessionStore {
    root: PathBuf,
}

impl DirSessionStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn session_dir(&self, session: &SessionId) -> PathBuf {
        self.root.join(session.as_str())
    }

    fn document_path(&self, session: &SessionId, key: &str) -> PathBuf {
        self.session_dir(session)
            .join(format!("{key}.{DOCUMENT_EXT}"))
    }

    fn log_path(&self, session: &SessionId, key: &str) -> PathBuf {
        self.session_dir(session).join(format!("{key}.{LOG_EXT}"))
    }
}

#[async_trait]
impl SessionStore for DirSessionStore {
    async fn put(&self, session: &SessionId, key: &str, document: &Value) -> Result<()> {
        fs::create_dir_all(self.session_dir(session)).await?;

        let path = self.document_path(session, key);
        let tmp_path = path.with_extension(format!("{DOCUMENT_EXT}.tmp"));
        fs::write(&tmp_path, serde_json::to_vec_pretty(document)?).await?;
        fs::rename(&tmp_path, &path).await?;

        tracing::debug!(session = %session, key, path = %path.display(), "document written");
        Ok(())
    }

    async fn get(&self, session: &SessionId, key: &str) -> Result<Option<Value>> {
        let path = self.document_path(session, key);
        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        serde_json::from_str(&content)
            .map(Some)
            .map_err(|e| KairosError::CorruptSessionDocument {
                path,
                reason: e.to_string(),
            })
    }

    async fn list_keys(&self, session: &SessionId) -> Result<Vec<String>> {
        let mut entries = match fs::read_dir(self.session_dir(session)).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut keys = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(DOCUMENT_EXT) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) {
                keys.push(stem.to_string());
            }
        }
        Ok(keys)
    }

    async fn list_sessions(&self) -> Result<Vec<String>> {
        let mut entries = match fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut sessions = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                sessions.push(name.to_string());
            }
        }
        Ok(sessions)
    }

    async fn append(&self, session: &SessionId, key: &str, record: &Value) -> Result<()> {
        fs::create_dir_all(self.session_dir(session)).await?;

        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');

        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.log_path(session, key))
            .await?;
        file.write_all(&line).await?;
        file.flush().await?;
        Ok(())
    }

    async fn read_log(&self, session: &SessionId, key: &str) -> Result<Vec<Value>> {
        let path = self.log_path(session, key);
        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| {
                serde_json::from_str(line).map_err(|e| KairosError::CorruptSessionDocument {
                    path: path.clone(),
                    reason: e.to_string(),
                })
            })
            .collect()
    }

    fn location(&self, session: &SessionId) -> String {
        self.session_dir(session).display().to_string()
    }
}

/// Map a topic title to the key of its result document.
pub fn topic_key(title: &str) -> String {
    let key: String = title
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    match key.as_str() {
        "" | "." | ".." => format!("{key}_"),
        SYLLABUS_KEY | TRANSCRIPT_LOG_KEY | PLAYLIST_KEY => format!("{key}_topic"),
        _ => key,
    }
}
