//! File-backed store for named selector shortcuts.

use std::env;
use std::fs;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Mutex;
use std::sync::PoisonError;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

const STORE_FILE: &str = "selectors.json";

/// Resolves the selector store path: explicit env override, then the XDG
/// data directory, then a home-relative fallback.
pub fn store_path() -> PathBuf {
    if let Ok(path) = env::var("DOMBRIDGE_SELECTORS") {
        return PathBuf::from(path);
    }
    if let Ok(data_home) = env::var("XDG_DATA_HOME") {
        return PathBuf::from(data_home).join("dombridge").join(STORE_FILE);
    }
    if let Ok(home) = env::var("HOME") {
        return PathBuf::from(home)
            .join(".local")
            .join("share")
            .join("dombridge")
            .join(STORE_FILE);
    }
    PathBuf::from("/tmp").join(format!("dombridge-{STORE_FILE}"))
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to read selector store at {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write selector store at {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("selector store at {path} is not valid JSON: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("no saved selector named '{0}'")]
    NotFound(String),
}

/// One saved selector: a memorable name bound to a selector plus the action
/// it is usually replayed with.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SelectorRecord {
    pub name: String,
    pub selector: String,
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// In-memory view of the store with write-through persistence. Saves are
/// atomic via a temp file rename next to the target.
#[derive(Debug)]
pub struct SelectorStore {
    path: PathBuf,
    records: Mutex<Vec<SelectorRecord>>,
}

impl SelectorStore {
    /// Opens the store, creating an empty one when the file is absent.
    pub fn open(path: PathBuf) -> Result<Self, StoreError> {
        let records = match fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str(&raw).map_err(|source| StoreError::Corrupt {
                path: path.clone(),
                source,
            })?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(source) => {
                return Err(StoreError::Read {
                    path,
                    source,
                });
            }
        };
        debug!(path = %path.display(), count = records.len(), "selector store opened");
        Ok(Self {
            path,
            records: Mutex::new(records),
        })
    }

    pub fn list(&self) -> Vec<SelectorRecord> {
        self.lock().clone()
    }

    /// Inserts or replaces the record with the same name.
    pub fn save(&self, record: SelectorRecord) -> Result<(), StoreError> {
        let snapshot = {
            let mut records = self.lock();
            if let Some(existing) = records.iter_mut().find(|r| r.name == record.name) {
                *existing = record;
            } else {
                records.push(record);
            }
            records.clone()
        };
        self.persist(&snapshot)
    }

    pub fn delete(&self, name: &str) -> Result<(), StoreError> {
        let snapshot = {
            let mut records = self.lock();
            let before = records.len();
            records.retain(|r| r.name != name);
            if records.len() == before {
                return Err(StoreError::NotFound(name.to_string()));
            }
            records.clone()
        };
        self.persist(&snapshot)
    }

    fn persist(&self, records: &[SelectorRecord]) -> Result<(), StoreError> {
        let write_err = |source| StoreError::Write {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(write_err)?;
        }
        let body = serde_json::to_vec_pretty(records).map_err(|source| StoreError::Corrupt {
            path: self.path.clone(),
            source,
        })?;
        let tmp = temp_sibling(&self.path);
        fs::write(&tmp, body).map_err(write_err)?;
        fs::rename(&tmp, &self.path).map_err(write_err)?;
        Ok(())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<SelectorRecord>> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

fn temp_sibling(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "store".to_string());
    name.push_str(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record(name: &str) -> SelectorRecord {
        SelectorRecord {
            name: name.to_string(),
            selector: format!("#{name}"),
            action: "click_element".to_string(),
            text: None,
            key: None,
            description: Some(format!("the {name} button")),
        }
    }

    #[test]
    fn test_open_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = SelectorStore::open(dir.path().join("selectors.json")).unwrap();
        assert!(store.list().is_empty());
    }

    #[test]
    fn test_save_persists_across_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("selectors.json");
        let store = SelectorStore::open(path.clone()).unwrap();
        store.save(record("login")).unwrap();
        store.save(record("search")).unwrap();

        let reopened = SelectorStore::open(path).unwrap();
        let records = reopened.list();
        assert_eq!(records.len(), 2);
        let login = records.iter().find(|r| r.name == "login").unwrap();
        assert_eq!(login.selector, "#login");
    }

    #[test]
    fn test_save_with_same_name_replaces() {
        let dir = TempDir::new().unwrap();
        let store = SelectorStore::open(dir.path().join("selectors.json")).unwrap();
        store.save(record("login")).unwrap();

        let mut updated = record("login");
        updated.selector = "#login-v2".to_string();
        store.save(updated).unwrap();

        let records = store.list();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].selector, "#login-v2");
    }

    #[test]
    fn test_delete_removes_and_errors_when_absent() {
        let dir = TempDir::new().unwrap();
        let store = SelectorStore::open(dir.path().join("selectors.json")).unwrap();
        store.save(record("login")).unwrap();
        store.delete("login").unwrap();
        assert!(store.list().is_empty());
        assert!(matches!(
            store.delete("login"),
            Err(StoreError::NotFound(name)) if name == "login"
        ));
    }

    #[test]
    fn test_corrupt_store_is_reported() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("selectors.json");
        fs::write(&path, "not json").unwrap();
        assert!(matches!(
            SelectorStore::open(path),
            Err(StoreError::Corrupt { .. })
        ));
    }

    #[test]
    fn test_missing_dir_created_on_first_save() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("deep").join("selectors.json");
        let store = SelectorStore::open(path).unwrap();
        store.save(record("login")).unwrap();
        assert_eq!(store.list().len(), 1);
    }
}
