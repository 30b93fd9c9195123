/// Durable key-value storage shared by the ledger and the changelog metadata.
///
/// Values are opaque JSON documents. Callers decide how to interpret them and
/// what to do when a stored document no longer matches the expected shape.
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;
use tracing::warn;

/// Key under which the ledger document is stored.
pub const SETTINGS_KEY: &str = "settings";
/// Key under which the "changelog shown" metadata is stored.
pub const CURRENT_VERSION_INFO_KEY: &str = "currentVersionInfo";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to read value for key '{key}': {source}")]
    Read {
        key: String,
        #[source]
        source: std::io::Error,
    },
    #[error("stored value for key '{key}' is not valid JSON: {source}")]
    Decode {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to write value for key '{key}': {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode value for key '{key}': {source}")]
    Encode {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

pub trait KeyValueStore: Send + Sync {
    /// Returns the stored value, `Ok(None)` when the key is absent, or an
    /// error when something is stored but cannot be read back.
    fn load(&self, key: &str) -> Result<Option<Value>, StoreError>;

    fn save(&self, key: &str, value: &Value) -> Result<(), StoreError>;

    /// Moves whatever is stored under `key` aside so a later `save` cannot
    /// destroy it. Succeeds trivially when nothing is stored.
    fn backup(&self, key: &str) -> Result<(), StoreError>;
}

/// Stores each key as `<dir>/<key>.json`.
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Creates the backing directory if needed.
    pub fn open(dir: impl Into<PathBuf>) -> std::io::Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }

    /// Where [`KeyValueStore::backup`] moves the document for `key`.
    pub fn backup_path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json.bak"))
    }
}

impl KeyValueStore for FileStore {
    fn load(&self, key: &str) -> Result<Option<Value>, StoreError> {
        let content = match std::fs::read_to_string(self.path_for(key)) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(StoreError::Read {
                    key: key.to_string(),
                    source,
                })
            }
        };
        serde_json::from_str(&content)
            .map(Some)
            .map_err(|source| StoreError::Decode {
                key: key.to_string(),
                source,
            })
    }

    fn save(&self, key: &str, value: &Value) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(value).map_err(|source| StoreError::Encode {
            key: key.to_string(),
            source,
        })?;

        // Write to a sibling file and rename so readers never see a torn document.
        let path = self.path_for(key);
        let tmp = self.dir.join(format!("{key}.json.tmp"));
        std::fs::write(&tmp, json)
            .and_then(|_| std::fs::rename(&tmp, &path))
            .map_err(|source| StoreError::Io {
                key: key.to_string(),
                source,
            })
    }

    fn backup(&self, key: &str) -> Result<(), StoreError> {
        let path = self.path_for(key);
        let backup = self.backup_path_for(key);
        match std::fs::rename(&path, &backup) {
            Ok(()) => {
                warn!(key, backup = %backup.display(), "Moved unreadable document aside");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StoreError::Io {
                key: key.to_string(),
                source,
            }),
        }
    }
}

/// Process-lifetime store used when no durable location is available.
#[derive(Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn load(&self, key: &str) -> Result<Option<Value>, StoreError> {
        let values = self.values.lock().unwrap_or_else(|e| e.into_inner());
        Ok(values.get(key).cloned())
    }

    fn save(&self, key: &str, value: &Value) -> Result<(), StoreError> {
        let mut values = self.values.lock().unwrap_or_else(|e| e.into_inner());
        values.insert(key.to_string(), value.clone());
        Ok(())
    }

    /// Keeps the old value under `<key>.bak`.
    fn backup(&self, key: &str) -> Result<(), StoreError> {
        let mut values = self.values.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(old) = values.remove(key) {
            values.insert(format!("{key}.bak"), old);
        }
        Ok(())
    }
}
