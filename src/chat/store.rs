//! JSON file persistence for chat sessions

use std::path::{Path, PathBuf};

use super::ChatSession;
use crate::{Error, Result};

/// Ordered session list persisted as a single JSON file, newest first
#[derive(Debug)]
pub struct SessionStore {
    path: PathBuf,
    sessions: Vec<ChatSession>,
}

impl SessionStore {
    /// Load sessions from `path`
    ///
    /// A missing file yields an empty store; an unreadable or corrupt file
    /// is logged and replaced on the next save.
    #[must_use]
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let sessions = match std::fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str::<Vec<ChatSession>>(&content) {
                Ok(sessions) => {
                    tracing::debug!(path = %path.display(), count = sessions.len(), "loaded sessions");
                    sessions
                }
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "failed to parse sessions, starting fresh"
                    );
                    Vec::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to read sessions, starting fresh"
                );
                Vec::new()
            }
        };

        Self { path, sessions }
    }

    /// Write all sessions to disk (temp file + rename)
    ///
    /// # Errors
    ///
    /// Returns error if the directory or file cannot be written
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_string_pretty(&self.sessions)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.path).map_err(|e| {
            Error::Storage(format!("failed to replace {}: {e}", self.path.display()))
        })?;

        tracing::trace!(path = %self.path.display(), "sessions saved");
        Ok(())
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All sessions, newest first
    #[must_use]
    pub fn sessions(&self) -> &[ChatSession] {
        &self.sessions
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&ChatSession> {
        self.sessions.iter().find(|s| s.id == id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut ChatSession> {
        self.sessions.iter_mut().find(|s| s.id == id)
    }

    /// Most recently created session
    #[must_use]
    pub fn first(&self) -> Option<&ChatSession> {
        self.sessions.first()
    }

    /// Create a session at the front of the list and return its id
    pub fn create(&mut self) -> String {
        let session = ChatSession::new();
        let id = session.id.clone();
        self.sessions.insert(0, session);
        tracing::debug!(%id, "session created");
        id
    }

    /// Remove a session
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFound` if no session has this id
    pub fn delete(&mut self, id: &str) -> Result<ChatSession> {
        let pos = self
            .sessions
            .iter()
            .position(|s| s.id == id)
            .ok_or_else(|| Error::NotFound(format!("session {id}")))?;
        Ok(self.sessions.remove(pos))
    }

    /// Resolve a session by id, id prefix or 1-based list position
    #[must_use]
    pub fn resolve(&self, key: &str) -> Option<&ChatSession> {
        let by_position = key
            .parse::<usize>()
            .ok()
            .and_then(|n| n.checked_sub(1))
            .and_then(|i| self.sessions.get(i));
        if by_position.is_some() {
            return by_position;
        }
        self.get(key).or_else(|| {
            let mut matches = self.sessions.iter().filter(|s| s.id.starts_with(key));
            let first = matches.next();
            // Ambiguous prefixes resolve to nothing
            matches.next().map_or(first, |_| None)
        })
    }
}
