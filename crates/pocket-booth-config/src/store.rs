//! Key-value stores and configuration sources.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use tracing::{debug, warn};

use crate::ConfigError;

/// Environment prefix for key-based configuration strings.
pub const ENV_CONFIG_PREFIX: &str = "POCKET_BOOTH_CONFIG_";

/// String key-value storage shared by the resolver and the app.
pub trait KeyValueStore: Send + Sync {
    /// Reads a value.
    fn get(&self, key: &str) -> Option<String>;

    /// Writes a value.
    ///
    /// # Errors
    /// Returns [`ConfigError::Storage`] when the backing medium fails.
    fn set(&self, key: &str, value: &str) -> Result<(), ConfigError>;

    /// Deletes a value. Missing keys are not an error.
    ///
    /// # Errors
    /// Returns [`ConfigError::Storage`] when the backing medium fails.
    fn remove(&self, key: &str) -> Result<(), ConfigError>;
}

/// Process-local store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<BTreeMap<String, String>>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn values(&self) -> MutexGuard<'_, BTreeMap<String, String>> {
        self.values
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), ConfigError> {
        self.values().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), ConfigError> {
        self.values().remove(key);
        Ok(())
    }
}

/// Store persisted as one JSON object on disk.
///
/// The file is read once on open and rewritten on every change.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    values: Mutex<BTreeMap<String, String>>,
}

impl JsonFileStore {
    /// Opens the store at `path`.
    ///
    /// A missing file starts an empty store. An unreadable or malformed file
    /// is logged and also starts empty; it is replaced on the next write.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let values = match fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str(&raw).unwrap_or_else(|error| {
                warn!(path = %path.display(), %error, "settings file is malformed; starting empty");
                BTreeMap::new()
            }),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(error) => {
                warn!(
                    path = %path.display(),
                    %error,
                    "settings file is unreadable; starting empty"
                );
                BTreeMap::new()
            }
        };

        debug!(path = %path.display(), entries = values.len(), "opened json store");
        Self {
            path,
            values: Mutex::new(values),
        }
    }

    /// Backing file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn update(
        &self,
        change: impl FnOnce(&mut BTreeMap<String, String>),
    ) -> Result<(), ConfigError> {
        let mut values = self
            .values
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut next = values.clone();
        change(&mut next);

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|error| storage_error(&self.path, error))?;
        }
        let raw = serde_json::to_string_pretty(&next)
            .map_err(|error| ConfigError::Storage(error.to_string()))?;
        fs::write(&self.path, raw).map_err(|error| storage_error(&self.path, error))?;

        // Memory only reflects what reached the disk.
        *values = next;
        Ok(())
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(key)
            .cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), ConfigError> {
        self.update(|values| {
            values.insert(key.to_string(), value.to_string());
        })
    }

    fn remove(&self, key: &str) -> Result<(), ConfigError> {
        self.update(|values| {
            values.remove(key);
        })
    }
}

fn storage_error(path: &Path, error: std::io::Error) -> ConfigError {
    ConfigError::Storage(format!("{}: {error}", path.display()))
}

/// Provider of key-based configuration strings.
pub trait ConfigSource: Send + Sync {
    /// Returns the raw configuration string for `key`, if any.
    fn lookup(&self, key: &str) -> Option<String>;
}

/// Reads `POCKET_BOOTH_CONFIG_<KEY>` from the process environment.
#[derive(Debug, Clone)]
pub struct EnvConfigSource {
    prefix: String,
}

impl EnvConfigSource {
    /// Uses [`ENV_CONFIG_PREFIX`].
    pub fn new() -> Self {
        Self::with_prefix(ENV_CONFIG_PREFIX)
    }

    /// Uses a custom variable prefix.
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Environment variable consulted for `key`.
    pub fn variable_name(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key.to_uppercase())
    }
}

impl Default for EnvConfigSource {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigSource for EnvConfigSource {
    fn lookup(&self, key: &str) -> Option<String> {
        std::env::var(self.variable_name(key))
            .ok()
            .filter(|value| !value.trim().is_empty())
    }
}

/// Fixed in-memory configuration strings, matched case-insensitively.
#[derive(Debug, Clone, Default)]
pub struct MapConfigSource {
    entries: BTreeMap<String, String>,
}

impl MapConfigSource {
    /// Builds a source from `(key, config string)` pairs.
    pub fn new<K, V>(entries: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: AsRef<str>,
        V: Into<String>,
    {
        Self {
            entries: entries
                .into_iter()
                .map(|(key, value)| (key.as_ref().to_uppercase(), value.into()))
                .collect(),
        }
    }
}

impl ConfigSource for MapConfigSource {
    fn lookup(&self, key: &str) -> Option<String> {
        self.entries.get(&key.to_uppercase()).cloned()
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for stores and sources.

    use super::*;

    #[test]
    fn json_store_persists_across_reopen() {
        let dir = std::env::temp_dir().join(format!("pocket-booth-store-{}", std::process::id()));
        let path = dir.join("settings.json");
        let _ = fs::remove_file(&path);

        let store = JsonFileStore::open(&path);
        store.set("a", "1").expect("write should succeed");
        store.set("b", "2").expect("write should succeed");
        store.remove("b").expect("remove should succeed");

        let reopened = JsonFileStore::open(&path);
        assert_eq!(reopened.get("a").as_deref(), Some("1"));
        assert_eq!(reopened.get("b"), None);

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn malformed_json_store_starts_empty() {
        let dir = std::env::temp_dir().join(format!("pocket-booth-bad-{}", std::process::id()));
        fs::create_dir_all(&dir).expect("temp dir");
        let path = dir.join("settings.json");
        fs::write(&path, "{not json").expect("fixture write");

        let store = JsonFileStore::open(&path);
        assert_eq!(store.get("anything"), None);

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn failed_json_write_leaves_memory_unchanged() {
        // A directory at the file path makes every write fail.
        let path = std::env::temp_dir().join(format!("pocket-booth-dir-{}", std::process::id()));
        fs::create_dir_all(&path).expect("temp dir");

        let store = JsonFileStore::open(&path);
        assert!(matches!(store.set("a", "1"), Err(ConfigError::Storage(_))));
        assert_eq!(store.get("a"), None);

        let _ = fs::remove_dir_all(&path);
    }

    #[test]
    fn map_source_ignores_key_case() {
        let source = MapConfigSource::new([("event42", "true,folder")]);
        assert_eq!(source.lookup("EVENT42").as_deref(), Some("true,folder"));
        assert_eq!(EnvConfigSource::new().variable_name("event42"), "POCKET_BOOTH_CONFIG_EVENT42");
    }
}
