//! On-disk persistence for in-progress deletion sessions.
//!
//! One pretty-printed JSON file per session (`<uuid>.json`). Writes go to a
//! temp file in the same directory and are renamed into place while holding
//! an exclusive lock on `.lock`, so two processes never interleave partial
//! writes. Terminal sessions are removed instead of saved.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use fs2::FileExt;
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::store::ErrorClass;

use super::deletion::{DeletionError, DeletionSession};

const LOCK_FILE: &str = ".lock";

#[derive(Debug, Error)]
pub enum SessionStoreError {
    #[error("no saved session {0}")]
    NotFound(Uuid),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed session file {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("session file {path} failed validation: {source}")]
    Invalid {
        path: PathBuf,
        #[source]
        source: DeletionError,
    },
}

impl SessionStoreError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::NotFound(_) => ErrorClass::NotFound,
            Self::Json { .. } | Self::Invalid { .. } => ErrorClass::Validation,
            Self::Io { .. } => ErrorClass::Other,
        }
    }

    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Directory of saved deletion sessions
#[derive(Debug, Clone)]
pub struct SessionStore {
    dir: PathBuf,
}

impl SessionStore {
    /// Open (creating if needed) a session directory.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, SessionStoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| SessionStoreError::io(&dir, e))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, id: Uuid) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }

    /// Persist a session, or delete its file once it is done or aborted.
    pub fn save(&self, session: &DeletionSession) -> Result<(), SessionStoreError> {
        if session.status().is_terminal() {
            return self.remove(session.id());
        }

        let path = self.path_for(session.id());
        let json = serde_json::to_string_pretty(session).map_err(|source| {
            SessionStoreError::Json {
                path: path.clone(),
                source,
            }
        })?;

        let _lock = self.lock()?;

        let mut temp = tempfile::NamedTempFile::new_in(&self.dir)
            .map_err(|e| SessionStoreError::io(&self.dir, e))?;
        let temp_path = temp.path().to_path_buf();
        temp.write_all(json.as_bytes())
            .map_err(|e| SessionStoreError::io(&temp_path, e))?;
        temp.flush()
            .map_err(|e| SessionStoreError::io(&temp_path, e))?;
        temp.persist(&path)
            .map_err(|e| SessionStoreError::io(&path, e.error))?;

        debug!(session = %session.id(), path = %path.display(), "Saved session");
        Ok(())
    }

    /// Load and validate a saved session.
    pub fn load(&self, id: Uuid) -> Result<DeletionSession, SessionStoreError> {
        let path = self.path_for(id);
        if !path.exists() {
            return Err(SessionStoreError::NotFound(id));
        }
        read_session(&path)
    }

    /// Delete a saved session. Missing files are not an error.
    pub fn remove(&self, id: Uuid) -> Result<(), SessionStoreError> {
        let path = self.path_for(id);
        let _lock = self.lock()?;

        match fs::remove_file(&path) {
            Ok(()) => {
                debug!(session = %id, "Removed session file");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(SessionStoreError::io(&path, e)),
        }
    }

    /// All readable saved sessions, most recently updated first.
    ///
    /// Files that fail to parse or validate are logged and skipped.
    pub fn list(&self) -> Result<Vec<DeletionSession>, SessionStoreError> {
        let entries = fs::read_dir(&self.dir).map_err(|e| SessionStoreError::io(&self.dir, e))?;

        let mut sessions = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| SessionStoreError::io(&self.dir, e))?;
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }

            match read_session(&path) {
                Ok(session) => sessions.push(session),
                Err(e) => warn!(path = %path.display(), error = %e, "Skipping unreadable session"),
            }
        }

        sessions.sort_by(|a, b| b.updated_at().cmp(&a.updated_at()));
        Ok(sessions)
    }

    fn lock(&self) -> Result<File, SessionStoreError> {
        let path = self.dir.join(LOCK_FILE);
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .map_err(|e| SessionStoreError::io(&path, e))?;

        // Released when the returned handle is dropped
        file.lock_exclusive()
            .map_err(|e| SessionStoreError::io(&path, e))?;
        Ok(file)
    }
}

fn read_session(path: &Path) -> Result<DeletionSession, SessionStoreError> {
    let content = fs::read_to_string(path).map_err(|e| SessionStoreError::io(path, e))?;
    let session: DeletionSession =
        serde_json::from_str(&content).map_err(|source| SessionStoreError::Json {
            path: path.to_path_buf(),
            source,
        })?;
    session.validate().map_err(|source| SessionStoreError::Invalid {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(session)
}
