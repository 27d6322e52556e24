//! Persistent key/value settings.
//!
//! Values are stored as strings and parsed on read; a missing or
//! unparsable value reads as the type's default.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::EqError;

/// Host of the last successful connection.
pub const LAST_ADDRESS: &str = "last_address";

pub trait KeyValueStore {
    fn contains(&self, key: &str) -> bool;

    fn raw(&self, key: &str) -> Option<&str>;

    fn save(&mut self, key: &str, value: &str) -> Result<(), EqError>;

    fn get_string(&self, key: &str) -> String {
        self.raw(key).unwrap_or_default().to_string()
    }

    fn get_int(&self, key: &str) -> i64 {
        self.raw(key)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or_default()
    }

    fn get_double(&self, key: &str) -> f64 {
        self.raw(key)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or_default()
    }
}

/// Settings kept only for the life of the process.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    values: BTreeMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    fn raw(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    fn save(&mut self, key: &str, value: &str) -> Result<(), EqError> {
        self.values.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Settings persisted as a flat JSON object, rewritten on every save.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    values: BTreeMap<String, String>,
}

impl JsonFileStore {
    /// Opens `path`, starting empty if the file does not exist or cannot
    /// be parsed.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let values = match fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(values) => values,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "ignoring unreadable settings");
                    BTreeMap::new()
                }
            },
            Err(_) => {
                debug!(path = %path.display(), "no settings file yet");
                BTreeMap::new()
            }
        };
        Self { path, values }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl KeyValueStore for JsonFileStore {
    fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    fn raw(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    fn save(&mut self, key: &str, value: &str) -> Result<(), EqError> {
        self.values.insert(key.to_string(), value.to_string());
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, serde_json::to_string_pretty(&self.values)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("eqconnect-{}-{name}.json", std::process::id()))
    }

    #[test]
    fn memory_store_defaults() {
        let mut store = MemoryStore::new();
        assert!(!store.contains(LAST_ADDRESS));
        assert_eq!(store.get_string(LAST_ADDRESS), "");
        assert_eq!(store.get_int("count"), 0);

        store.save("count", "7").unwrap();
        store.save("ratio", "0.25").unwrap();
        store.save("broken", "seven").unwrap();
        assert_eq!(store.get_int("count"), 7);
        assert_eq!(store.get_double("ratio"), 0.25);
        assert_eq!(store.get_int("broken"), 0);
    }

    #[test]
    fn json_store_persists_across_opens() {
        let path = temp_path("persist");
        let _ = fs::remove_file(&path);

        let mut store = JsonFileStore::open(&path);
        store.save(LAST_ADDRESS, "192.168.1.20").unwrap();

        let reopened = JsonFileStore::open(&path);
        assert!(reopened.contains(LAST_ADDRESS));
        assert_eq!(reopened.get_string(LAST_ADDRESS), "192.168.1.20");

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn json_store_ignores_corrupt_file() {
        let path = temp_path("corrupt");
        fs::write(&path, "not json").unwrap();

        let store = JsonFileStore::open(&path);
        assert!(!store.contains(LAST_ADDRESS));

        let _ = fs::remove_file(&path);
    }
}
