//! Persisted-settings contract and the file-backed production store.

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

use thiserror::Error;
use tracing::warn;

/// Errors from a settings store backend.
#[derive(Error, Debug)]
pub enum ConfigStoreError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Settings file is not the expected JSON shape
    #[error("Settings file corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// Completion callback for [`ConfigStore::save_settings`].
///
/// May be invoked synchronously on the caller's stack; callers must not
/// assume the save has been deferred.
pub type SaveDone = Box<dyn FnOnce(Result<(), ConfigStoreError>) + Send>;

/// Key/value settings persistence.
///
/// Loads are synchronous; saves are asynchronous by contract, reporting
/// completion through `done`.
pub trait ConfigStore: Send + Sync {
    /// Read the value stored under `key`, or `None` if never written.
    fn load_settings(&self, key: &str) -> Option<String>;

    /// Persist `value` under `key`, invoking `done` when the write settles.
    fn save_settings(&self, key: &str, value: String, done: Option<SaveDone>);
}

/// Settings store keeping all keys in a single JSON object file.
///
/// Writes are flushed inline and `done` runs before `save_settings` returns.
pub struct FileConfigStore {
    path: PathBuf,
    settings: Mutex<BTreeMap<String, String>>,
}

impl FileConfigStore {
    /// Open (or create on first save) the settings file at `path`.
    ///
    /// An unreadable or malformed file starts empty; the next save
    /// overwrites it.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let settings = match fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str(&raw).unwrap_or_else(|err| {
                warn!(path = %path.display(), %err, "settings file corrupt, starting empty");
                BTreeMap::new()
            }),
            Err(_) => BTreeMap::new(),
        };
        Self {
            path,
            settings: Mutex::new(settings),
        }
    }

    fn flush(&self, settings: &BTreeMap<String, String>) -> Result<(), ConfigStoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let raw = serde_json::to_string_pretty(settings)?;
        fs::write(&self.path, raw)?;
        Ok(())
    }
}

impl ConfigStore for FileConfigStore {
    fn load_settings(&self, key: &str) -> Option<String> {
        self.settings.lock().unwrap().get(key).cloned()
    }

    fn save_settings(&self, key: &str, value: String, done: Option<SaveDone>) {
        let result = {
            let mut settings = self.settings.lock().unwrap();
            settings.insert(key.to_string(), value);
            self.flush(&settings)
        };
        if let Err(ref err) = result {
            warn!(key, %err, "settings save failed");
        }
        if let Some(done) = done {
            done(result);
        }
    }
}
