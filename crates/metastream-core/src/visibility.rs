//! Local, non-destructive hide/unhide of records.
//!
//! Hidden records are tracked as a set of composite keys
//! (`fileName::recordId`) serialized as one JSON array under a single
//! storage name. Nothing here touches the backend: hiding is a view
//! preference that survives reloads on this client only.
//!
//! Every operation loads the whole set, changes it, and writes it back.
//! Missing, unreadable or corrupt data reads as an empty set.
//!
//! ```rust
//! use metastream_core::visibility::{MemoryStorage, VisibilityKey, VisibilityStore};
//!
//! let store = VisibilityStore::new(MemoryStorage::new());
//! let key = VisibilityKey::new("a.csv", "r1");
//! store.hide(&key).unwrap();
//! assert!(store.is_hidden(&key));
//! store.unhide(&key).unwrap();
//! assert!(!store.is_hidden(&key));
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::RwLock;

use anyhow::Result;

use crate::models::CanonicalRecord;

/// Storage name holding the hidden-key set.
pub const HIDDEN_KEYS_STORAGE_NAME: &str = "metastream.hiddenKeys.v1";

/// Persistent client key-value storage (one string per name).
pub trait StoragePort: Send + Sync {
    fn read(&self, name: &str) -> Result<Option<String>>;
    fn write(&self, name: &str, value: &str) -> Result<()>;
    fn remove(&self, name: &str) -> Result<()>;
}

/// In-process [`StoragePort`] for tests and WASM hosts without storage.
#[derive(Default)]
pub struct MemoryStorage {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StoragePort for MemoryStorage {
    fn read(&self, name: &str) -> Result<Option<String>> {
        let entries = self
            .entries
            .read()
            .map_err(|_| anyhow::anyhow!("memory storage lock poisoned"))?;
        Ok(entries.get(name).cloned())
    }

    fn write(&self, name: &str, value: &str) -> Result<()> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| anyhow::anyhow!("memory storage lock poisoned"))?;
        entries.insert(name.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, name: &str) -> Result<()> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| anyhow::anyhow!("memory storage lock poisoned"))?;
        entries.remove(name);
        Ok(())
    }
}

/// Identity of a hidden entry: the file name plus the table record id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VisibilityKey {
    pub file_name: String,
    pub record_id: String,
}

impl VisibilityKey {
    pub fn new(file_name: impl Into<String>, record_id: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
            record_id: record_id.into(),
        }
    }

    pub fn for_record(record: &CanonicalRecord) -> Self {
        Self::new(record.filename.clone(), record.id.clone())
    }
}

impl fmt::Display for VisibilityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.file_name, self.record_id)
    }
}

/// The hidden-record set over an injected [`StoragePort`].
pub struct VisibilityStore<S> {
    storage: S,
}

impl<S: StoragePort> VisibilityStore<S> {
    pub fn new(storage: S) -> Self {
        Self { storage }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn is_hidden(&self, key: &VisibilityKey) -> bool {
        let composite = key.to_string();
        self.load().iter().any(|k| *k == composite)
    }

    /// Hide `key`. Hiding an already hidden key changes nothing.
    pub fn hide(&self, key: &VisibilityKey) -> Result<()> {
        let composite = key.to_string();
        let mut keys = self.load();
        if !keys.contains(&composite) {
            keys.push(composite);
        }
        self.save(&keys)
    }

    /// Unhide `key`. Unhiding a visible key changes nothing.
    pub fn unhide(&self, key: &VisibilityKey) -> Result<()> {
        let composite = key.to_string();
        let mut keys = self.load();
        keys.retain(|k| *k != composite);
        self.save(&keys)
    }

    /// Forget every hidden key.
    pub fn clear_all(&self) -> Result<()> {
        self.storage.remove(HIDDEN_KEYS_STORAGE_NAME)
    }

    /// Hidden composite keys, oldest first.
    pub fn list_hidden(&self) -> Vec<String> {
        self.load()
    }

    fn load(&self) -> Vec<String> {
        let raw = match self.storage.read(HIDDEN_KEYS_STORAGE_NAME) {
            Ok(Some(raw)) => raw,
            Ok(None) => return Vec::new(),
            Err(e) => {
                tracing::warn!("could not read hidden keys, treating as empty: {:#}", e);
                return Vec::new();
            }
        };
        match serde_json::from_str::<Vec<String>>(&raw) {
            Ok(mut keys) => {
                let mut seen = std::collections::HashSet::new();
                keys.retain(|k| seen.insert(k.clone()));
                keys
            }
            Err(e) => {
                tracing::warn!("hidden keys are corrupt, treating as empty: {}", e);
                Vec::new()
            }
        }
    }

    fn save(&self, keys: &[String]) -> Result<()> {
        let raw = serde_json::to_string(keys)?;
        self.storage.write(HIDDEN_KEYS_STORAGE_NAME, &raw)
    }
}

/// Drop hidden records unless `show_hidden` is set.
///
/// The hidden set is read once for the whole batch.
pub fn filter_visible<S: StoragePort>(
    records: Vec<CanonicalRecord>,
    store: &VisibilityStore<S>,
    show_hidden: bool,
) -> Vec<CanonicalRecord> {
    if show_hidden {
        return records;
    }
    let hidden: std::collections::HashSet<String> = store.list_hidden().into_iter().collect();
    if hidden.is_empty() {
        return records;
    }
    records
        .into_iter()
        .filter(|r| !hidden.contains(&VisibilityKey::for_record(r).to_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> VisibilityStore<MemoryStorage> {
        VisibilityStore::new(MemoryStorage::new())
    }

    #[test]
    fn hide_unhide_clear() {
        let s = store();
        let key = VisibilityKey::new("a.csv", "r1");
        assert!(!s.is_hidden(&key));

        s.hide(&key).unwrap();
        assert!(s.is_hidden(&key));
        assert!(!s.is_hidden(&VisibilityKey::new("a.csv", "r2")));

        s.unhide(&key).unwrap();
        assert!(!s.is_hidden(&key));

        s.hide(&key).unwrap();
        s.hide(&VisibilityKey::new("b.csv", "r2")).unwrap();
        s.clear_all().unwrap();
        assert!(s.list_hidden().is_empty());
    }

    #[test]
    fn hide_and_unhide_are_idempotent() {
        let s = store();
        let key = VisibilityKey::new("a.csv", "r1");
        s.hide(&key).unwrap();
        s.hide(&key).unwrap();
        assert_eq!(s.list_hidden(), vec!["a.csv::r1"]);

        s.unhide(&key).unwrap();
        s.unhide(&key).unwrap();
        assert!(s.list_hidden().is_empty());
    }

    #[test]
    fn stored_as_json_array_in_insertion_order() {
        let s = store();
        s.hide(&VisibilityKey::new("b.csv", "r2")).unwrap();
        s.hide(&VisibilityKey::new("a.csv", "r1")).unwrap();
        let raw = s.storage().read(HIDDEN_KEYS_STORAGE_NAME).unwrap().unwrap();
        assert_eq!(raw, r#"["b.csv::r2","a.csv::r1"]"#);
        assert_eq!(s.list_hidden(), vec!["b.csv::r2", "a.csv::r1"]);
    }

    #[test]
    fn survives_a_new_store_over_the_same_storage() {
        let s = store();
        s.hide(&VisibilityKey::new("a.csv", "r1")).unwrap();
        let reopened = VisibilityStore::new(s.storage);
        assert!(reopened.is_hidden(&VisibilityKey::new("a.csv", "r1")));
    }

    #[test]
    fn corrupt_data_reads_as_empty() {
        let s = store();
        s.storage().write(HIDDEN_KEYS_STORAGE_NAME, "{not json").unwrap();
        assert!(s.list_hidden().is_empty());
        assert!(!s.is_hidden(&VisibilityKey::new("a.csv", "r1")));

        // The next write replaces the corrupt value.
        s.hide(&VisibilityKey::new("a.csv", "r1")).unwrap();
        assert_eq!(s.list_hidden(), vec!["a.csv::r1"]);
    }

    #[test]
    fn duplicate_stored_keys_collapse() {
        let s = store();
        s.storage()
            .write(HIDDEN_KEYS_STORAGE_NAME, r#"["a::1","a::1","b::2"]"#)
            .unwrap();
        assert_eq!(s.list_hidden(), vec!["a::1", "b::2"]);
    }

    struct FailingStorage;

    impl StoragePort for FailingStorage {
        fn read(&self, _name: &str) -> Result<Option<String>> {
            anyhow::bail!("storage unavailable")
        }
        fn write(&self, _name: &str, _value: &str) -> Result<()> {
            anyhow::bail!("storage unavailable")
        }
        fn remove(&self, _name: &str) -> Result<()> {
            anyhow::bail!("storage unavailable")
        }
    }

    #[test]
    fn unreadable_storage_reads_as_empty_and_writes_report_errors() {
        let s = VisibilityStore::new(FailingStorage);
        assert!(s.list_hidden().is_empty());
        assert!(s.hide(&VisibilityKey::new("a.csv", "r1")).is_err());
    }

    #[test]
    fn filter_visible_respects_show_hidden() {
        let s = store();
        let records = vec![
            CanonicalRecord {
                id: "r1".into(),
                filename: "a.csv".into(),
                ..Default::default()
            },
            CanonicalRecord {
                id: "r2".into(),
                filename: "b.csv".into(),
                ..Default::default()
            },
        ];
        s.hide(&VisibilityKey::for_record(&records[0])).unwrap();

        let visible = filter_visible(records.clone(), &s, false);
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].id, "r2");
        assert_eq!(filter_visible(records, &s, true).len(), 2);
    }
}
