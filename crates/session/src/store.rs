//! Durable key-value storage for the session record

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use log::{debug, warn};

use crate::record::SessionRecord;
use crate::{Result, SessionError};

/// Key the session record lives under
pub const DEFAULT_SESSION_KEY: &str = "appData";

/// String key-value storage with the semantics of browser local storage
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;

    fn set(&self, key: &str, value: &str) -> Result<()>;

    fn delete(&self, key: &str) -> Result<()>;
}

/// In-memory store; contents are lost when dropped
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> Result<MutexGuard<'_, HashMap<String, String>>> {
        self.entries
            .lock()
            .map_err(|_| SessionError::storage("memory store lock poisoned"))
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.entries()?.remove(key);
        Ok(())
    }
}

/// Store backed by a single JSON object on disk
///
/// Every write rewrites the whole file through a sibling temp file and a
/// rename, so readers never observe a half-written record.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<HashMap<String, String>> {
        match fs::read_to_string(&self.path) {
            Ok(contents) if contents.trim().is_empty() => Ok(HashMap::new()),
            Ok(contents) => Ok(serde_json::from_str(&contents)?),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
            Err(err) => Err(err.into()),
        }
    }

    fn write_all(&self, entries: &HashMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let tmp = self.temp_path();
        fs::write(&tmp, serde_json::to_vec_pretty(entries)?)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    /// Sibling of the store file, named after the full file name
    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".tmp");
        PathBuf::from(name)
    }

    fn locked(&self) -> Result<MutexGuard<'_, ()>> {
        self.lock
            .lock()
            .map_err(|_| SessionError::storage("file store lock poisoned"))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let _guard = self.locked()?;
        Ok(self.read_all()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let _guard = self.locked()?;
        let mut entries = self.read_all()?;
        entries.insert(key.to_string(), value.to_string());
        self.write_all(&entries)
    }

    fn delete(&self, key: &str) -> Result<()> {
        let _guard = self.locked()?;
        let mut entries = self.read_all()?;
        if entries.remove(key).is_some() {
            self.write_all(&entries)?;
        }
        Ok(())
    }
}

/// Typed access to the session record inside a [`KeyValueStore`]
#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<dyn KeyValueStore>,
    key: String,
}

impl SessionStore {
    pub fn new(inner: Arc<dyn KeyValueStore>) -> Self {
        Self::with_key(inner, DEFAULT_SESSION_KEY)
    }

    pub fn with_key(inner: Arc<dyn KeyValueStore>, key: &str) -> Self {
        Self {
            inner,
            key: key.to_string(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// The underlying key-value store, shared with other cached data
    pub fn backend(&self) -> Arc<dyn KeyValueStore> {
        Arc::clone(&self.inner)
    }

    /// Read the record; `Ok(None)` when nothing is stored, an error when the
    /// stored value is not a JSON object
    pub fn load(&self) -> Result<Option<SessionRecord>> {
        match self.inner.get(&self.key)? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    /// Persist the whole record in one write
    pub fn save(&self, record: &SessionRecord) -> Result<()> {
        let raw = serde_json::to_string(record)?;
        self.inner.set(&self.key, &raw)?;
        debug!("Session record saved under {}", self.key);
        Ok(())
    }

    pub fn clear(&self) -> Result<()> {
        self.inner.delete(&self.key)?;
        debug!("Session record cleared from {}", self.key);
        Ok(())
    }

    /// Clear without failing; used on paths that are already denying access
    pub(crate) fn clear_quietly(&self) {
        if let Err(e) = self.clear() {
            warn!("Failed to clear session record: {}", e);
        }
    }
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore").field("key", &self.key).finish()
    }
}
