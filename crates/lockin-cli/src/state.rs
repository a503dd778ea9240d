//! Sessions that outlive a single CLI invocation.
//!
//! The engine keeps no clock of its own, so each `lockin session ...` call loads
//! the in-flight sessions, applies one command, and writes them back. An
//! exclusive lock on a sibling `.lock` file is held from load to save so
//! concurrent invocations serialize instead of overwriting each other.

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use fs2::FileExt;
use lockin_core::{GroupId, Session};
use serde::{Deserialize, Serialize};

#[derive(Debug, Default, Serialize, Deserialize)]
struct StateFile {
    sessions: Vec<Session>,
}

/// Locked view of the session state file.
///
/// The lock is released when the store is dropped.
#[derive(Debug)]
pub struct SessionStore {
    path: PathBuf,
    sessions: Vec<Session>,
    _lock: File,
}

impl SessionStore {
    /// Locks and loads the state file, treating a missing file as empty.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("failed to create state directory")?;
        }

        let lock = File::create(lock_path(path)).context("failed to create lock file")?;
        lock.lock_exclusive()
            .context("failed to acquire session state lock")?;

        let state = match fs::read_to_string(path) {
            Ok(contents) => serde_json::from_str::<StateFile>(&contents)
                .with_context(|| format!("failed to parse {}", path.display()))?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => StateFile::default(),
            Err(err) => {
                return Err(err).with_context(|| format!("failed to read {}", path.display()));
            }
        };
        tracing::debug!(
            path = %path.display(),
            sessions = state.sessions.len(),
            "loaded session state"
        );

        Ok(Self {
            path: path.to_path_buf(),
            sessions: state.sessions,
            _lock: lock,
        })
    }

    pub fn get(&self, group: GroupId) -> Option<&Session> {
        self.sessions.iter().find(|session| session.group() == group)
    }

    /// Active sessions ordered by group.
    pub fn sessions(&self) -> &[Session] {
        &self.sessions
    }

    /// Stores a session, replacing any previous one for the same group.
    pub fn put(&mut self, session: Session) {
        self.remove(session.group());
        self.sessions.push(session);
        self.sessions.sort_by_key(Session::group);
    }

    pub fn remove(&mut self, group: GroupId) -> Option<Session> {
        let index = self
            .sessions
            .iter()
            .position(|session| session.group() == group)?;
        Some(self.sessions.remove(index))
    }

    /// Writes the sessions back, replacing the file atomically.
    pub fn save(&self) -> Result<()> {
        let state = StateFile {
            sessions: self.sessions.clone(),
        };
        let json = serde_json::to_string_pretty(&state)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json).with_context(|| format!("failed to write {}", tmp.display()))?;
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("failed to replace {}", self.path.display()))?;
        Ok(())
    }
}

fn lock_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".lock");
    path.with_file_name(name)
}
