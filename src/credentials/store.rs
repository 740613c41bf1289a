//! JSON-file credential storage.
//!
//! The in-memory table is the source of truth between writes. Every mutation
//! rewrites the whole file through a temporary file and an atomic rename, so
//! a reader in the other process sees either the old or the new table, never
//! a partial one.

use super::CredentialRecord;
use crate::error::BridgeError;
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, error, info, warn};

type SessionTable = HashMap<String, CredentialRecord>;

/// Credential records keyed by session ID, mirrored to a JSON file.
///
/// # Thread Safety
/// - Table is wrapped in an RwLock; dependents share the store through `Arc`
/// - Not designed for several writers across processes: the authorization
///   server writes, the tool server reads at boot and writes back refreshed
///   records through [`CredentialStore::update_if_current`]
pub struct CredentialStore {
    path: PathBuf,
    sessions: RwLock<SessionTable>,
    /// Held from a table change through the rename that persists it
    write_lock: Mutex<()>,
}

impl CredentialStore {
    /// Opens the session file at `path`.
    ///
    /// - Missing file: starts empty and writes `{}` to disk
    /// - Unparseable file: logs, starts empty, leaves the file alone until
    ///   the next successful `put`
    /// - Any other read error: logs and starts empty
    pub fn load<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref().to_path_buf();

        let sessions = match read_table_from(&path) {
            Ok(sessions) => {
                info!(path = %path.display(), sessions = sessions.len(), "Session file loaded");
                sessions
            }
            Err(ReadError::Missing) => {
                debug!(path = %path.display(), "Session file not found, creating empty one");
                let store = Self::with_table(path, SessionTable::new());
                if let Err(e) = store.persist() {
                    warn!(error = %e, "Could not create session file");
                }
                return store;
            }
            Err(ReadError::Corrupt(err)) => {
                error!(error = %err, "Ignoring corrupt session file, starting with no sessions");
                SessionTable::new()
            }
            Err(ReadError::Io(e)) => {
                error!(path = %path.display(), error = %e, "Failed to read session file, starting with no sessions");
                SessionTable::new()
            }
        };

        Self::with_table(path, sessions)
    }

    fn with_table(path: PathBuf, sessions: SessionTable) -> Self {
        Self {
            path,
            sessions: RwLock::new(sessions),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stores `record` as the only session, evicting all others, then
    /// persists.
    ///
    /// A failed write is logged and otherwise ignored: the in-memory table
    /// already reflects the update.
    pub fn put(&self, session_id: &str, record: CredentialRecord) {
        let _write = self.lock_writes();

        {
            let mut sessions = self.write_table();
            let evicted = sessions.keys().filter(|id| *id != session_id).count();
            if evicted > 0 {
                info!(evicted, "Replacing existing sessions with the new one");
            }
            *sessions = SessionTable::from([(session_id.to_string(), record)]);
        }

        if let Err(e) = self.persist_locked() {
            warn!(error = %e, "Session kept in memory only");
        }
    }

    /// Writes back a refreshed record for `session_id`, but only if the file
    /// on disk still holds exactly that session.
    ///
    /// Another process may have completed a new flow since this store was
    /// loaded; in that case the file is left alone, the in-memory table is
    /// synced to it and `Ok(false)` is returned.
    pub fn update_if_current(&self, session_id: &str, record: CredentialRecord) -> Result<bool, BridgeError> {
        let _write = self.lock_writes();

        let on_disk = match read_table_from(&self.path) {
            Ok(table) => table,
            Err(ReadError::Missing) => SessionTable::new(),
            Err(ReadError::Corrupt(err)) => return Err(err),
            Err(ReadError::Io(source)) => {
                return Err(BridgeError::Persistence {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        if on_disk.len() != 1 || !on_disk.contains_key(session_id) {
            warn!(
                session_id = %session_id,
                sessions_on_disk = on_disk.len(),
                "Session no longer current on disk, refreshed token kept in memory only"
            );
            *self.write_table() = on_disk;
            return Ok(false);
        }

        *self.write_table() = SessionTable::from([(session_id.to_string(), record)]);
        self.persist_locked()?;
        Ok(true)
    }

    pub fn get(&self, session_id: &str) -> Option<CredentialRecord> {
        self.read_table().get(session_id).cloned()
    }

    /// Removes a session. Returns whether it existed.
    pub fn delete(&self, session_id: &str) -> bool {
        let _write = self.lock_writes();
        let removed = self.write_table().remove(session_id).is_some();

        if removed {
            if let Err(e) = self.persist_locked() {
                warn!(error = %e, "Session deletion kept in memory only");
            }
        }

        removed
    }

    /// Session IDs currently held, sorted (oldest first given the ID scheme).
    pub fn sessions(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.read_table().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.read_table().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read_table().is_empty()
    }

    /// Rewrites the whole session file from the in-memory table.
    ///
    /// Uses atomic write: writes to .tmp file, fsyncs, then renames.
    pub fn persist(&self) -> Result<(), BridgeError> {
        let _write = self.lock_writes();
        self.persist_locked()
    }

    /// Caller holds `write_lock`.
    fn persist_locked(&self) -> Result<(), BridgeError> {
        let json = {
            let sessions = self.read_table();
            serde_json::to_string_pretty(&*sessions).map_err(|e| BridgeError::Persistence {
                path: self.path.clone(),
                source: std::io::Error::new(std::io::ErrorKind::InvalidData, e),
            })?
        };

        self.write_atomic(json.as_bytes())
            .map_err(|source| BridgeError::Persistence {
                path: self.path.clone(),
                source,
            })?;

        debug!(path = %self.path.display(), "Session file written");
        Ok(())
    }

    fn write_atomic(&self, contents: &[u8]) -> std::io::Result<()> {
        let tmp_path = tmp_path_for(&self.path);

        let result = create_private(&tmp_path).and_then(|mut tmp_file| {
            tmp_file.write_all(contents)?;
            tmp_file.sync_all()?;
            drop(tmp_file);
            fs::rename(&tmp_path, &self.path)
        });

        if result.is_err() {
            let _ = fs::remove_file(&tmp_path);
        }
        result
    }

    fn lock_writes(&self) -> MutexGuard<'_, ()> {
        self.write_lock.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn read_table(&self) -> RwLockReadGuard<'_, SessionTable> {
        self.sessions.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_table(&self) -> RwLockWriteGuard<'_, SessionTable> {
        self.sessions.write().unwrap_or_else(|e| e.into_inner())
    }
}

enum ReadError {
    Missing,
    Corrupt(BridgeError),
    Io(std::io::Error),
}

fn read_table_from(path: &Path) -> Result<SessionTable, ReadError> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(ReadError::Missing),
        Err(e) => return Err(ReadError::Io(e)),
    };

    serde_json::from_str(&contents).map_err(|source| {
        ReadError::Corrupt(BridgeError::CorruptStore {
            path: path.to_path_buf(),
            source,
        })
    })
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Creates `path` for writing, readable by the owner only on Unix.
fn create_private(path: &Path) -> std::io::Result<File> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);

    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    options.open(path)
}
