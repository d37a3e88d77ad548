//! Conversation session identity.
//!
//! The session id is generated once and kept in durable local storage so the
//! service can associate every request of this client with one conversation.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, warn};
use uuid::Uuid;

/// Storage key under which the session id is kept.
pub const SESSION_KEY: &str = "chat_session_id";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SessionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for SessionId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Durable string key/value storage.
pub trait SessionStore: Send + Sync {
    fn load(&self, key: &str) -> Option<String>;
    fn store(&self, key: &str, value: &str) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

/// In-process storage; nothing survives the process.
#[derive(Default)]
pub struct MemorySessionStore {
    values: Mutex<BTreeMap<String, String>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemorySessionStore {
    fn load(&self, key: &str) -> Option<String> {
        self.values.lock().ok()?.get(key).cloned()
    }

    fn store(&self, key: &str, value: &str) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let mut values = self
            .values
            .lock()
            .map_err(|_| "session store lock poisoned")?;
        values.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// TOML file of string keys, rewritten atomically on every store.
pub struct FileSessionStore {
    path: PathBuf,
}

impl FileSessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store in the platform data directory, if one can be determined.
    pub fn in_data_dir() -> Option<Self> {
        let dirs = ProjectDirs::from("org", "askliam", "askliam")?;
        Some(Self::new(dirs.data_dir().join("state.toml")))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> BTreeMap<String, String> {
        let Ok(contents) = fs::read_to_string(&self.path) else {
            return BTreeMap::new();
        };
        match toml::from_str(&contents) {
            Ok(values) => values,
            Err(err) => {
                warn!(path = %self.path.display(), error = %err, "ignoring unreadable session state");
                BTreeMap::new()
            }
        }
    }
}

impl SessionStore for FileSessionStore {
    fn load(&self, key: &str) -> Option<String> {
        self.read_all().remove(key)
    }

    fn store(&self, key: &str, value: &str) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let mut values = self.read_all();
        values.insert(key.to_string(), value.to_string());

        let parent = self.path.parent().filter(|dir| !dir.as_os_str().is_empty());
        if let Some(dir) = parent {
            fs::create_dir_all(dir)?;
        }

        let contents = toml::to_string_pretty(&values)?;
        let mut temp_file = match parent {
            Some(dir) => NamedTempFile::new_in(dir)?,
            None => NamedTempFile::new()?,
        };
        temp_file.write_all(contents.as_bytes())?;
        temp_file.as_file_mut().sync_all()?;
        temp_file.persist(&self.path)?;
        Ok(())
    }
}

pub struct SessionManager {
    store: Box<dyn SessionStore>,
    current: Option<SessionId>,
}

impl SessionManager {
    pub fn new(store: Box<dyn SessionStore>) -> Self {
        Self {
            store,
            current: None,
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Box::new(MemorySessionStore::new()))
    }

    /// Returns the stored id, generating and persisting one on first use.
    ///
    /// Persistence is best effort: a storage failure is logged and the new id
    /// is still used for the lifetime of this manager.
    pub fn get_or_create_session_id(&mut self) -> SessionId {
        if let Some(id) = &self.current {
            return id.clone();
        }

        let id = match self.store.load(SESSION_KEY).filter(|id| !id.trim().is_empty()) {
            Some(stored) => {
                debug!(session_id = %stored, "restored session id");
                SessionId::from(stored)
            }
            None => {
                let id = SessionId::generate();
                self.persist(&id);
                debug!(session_id = %id, "created session id");
                id
            }
        };
        self.current = Some(id.clone());
        id
    }

    /// Starts a fresh session. Only meant for start-up, before any engine
    /// holds the current id.
    pub fn rotate(&mut self) -> SessionId {
        let id = SessionId::generate();
        self.persist(&id);
        self.current = Some(id.clone());
        id
    }

    fn persist(&self, id: &SessionId) {
        if let Err(err) = self.store.store(SESSION_KEY, id.as_str()) {
            warn!(error = %err, "failed to persist session id");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::TempDir;

    struct SharedStore(Arc<MemorySessionStore>);

    impl SessionStore for SharedStore {
        fn load(&self, key: &str) -> Option<String> {
            self.0.load(key)
        }

        fn store(&self, key: &str, value: &str) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
            self.0.store(key, value)
        }
    }

    struct FailingStore;

    impl SessionStore for FailingStore {
        fn load(&self, _key: &str) -> Option<String> {
            None
        }

        fn store(&self, _key: &str, _value: &str) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
            Err("read-only".into())
        }
    }

    #[test]
    fn repeated_calls_return_the_same_id() {
        let mut manager = SessionManager::in_memory();
        let first = manager.get_or_create_session_id();
        let second = manager.get_or_create_session_id();
        assert_eq!(first, second);
        assert!(Uuid::parse_str(first.as_str()).is_ok());
    }

    #[test]
    fn id_is_restored_from_shared_storage() {
        let backing = Arc::new(MemorySessionStore::new());
        let first = SessionManager::new(Box::new(SharedStore(Arc::clone(&backing))))
            .get_or_create_session_id();
        let second = SessionManager::new(Box::new(SharedStore(Arc::clone(&backing))))
            .get_or_create_session_id();
        assert_eq!(first, second);
        assert_eq!(backing.load(SESSION_KEY).as_deref(), Some(first.as_str()));
    }

    #[test]
    fn storage_failure_still_yields_a_stable_id() {
        let mut manager = SessionManager::new(Box::new(FailingStore));
        let first = manager.get_or_create_session_id();
        assert_eq!(manager.get_or_create_session_id(), first);
    }

    #[test]
    fn rotate_replaces_the_stored_id() {
        let backing = Arc::new(MemorySessionStore::new());
        let mut manager = SessionManager::new(Box::new(SharedStore(Arc::clone(&backing))));
        let original = manager.get_or_create_session_id();
        let rotated = manager.rotate();
        assert_ne!(original, rotated);
        assert_eq!(manager.get_or_create_session_id(), rotated);
        assert_eq!(backing.load(SESSION_KEY).as_deref(), Some(rotated.as_str()));
    }

    #[test]
    fn file_store_survives_new_instances() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let path = temp_dir.path().join("nested").join("state.toml");

        let first = SessionManager::new(Box::new(FileSessionStore::new(&path)))
            .get_or_create_session_id();
        assert!(path.exists());

        let second = SessionManager::new(Box::new(FileSessionStore::new(&path)))
            .get_or_create_session_id();
        assert_eq!(first, second);
    }

    #[test]
    fn file_store_keeps_unrelated_keys() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let store = FileSessionStore::new(temp_dir.path().join("state.toml"));
        store.store("other", "value").expect("store other");
        store.store(SESSION_KEY, "abc").expect("store session");
        assert_eq!(store.load("other").as_deref(), Some("value"));
        assert_eq!(store.load(SESSION_KEY).as_deref(), Some("abc"));
    }
}
