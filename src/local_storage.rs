//! File-backed [`StoragePort`]: one file per storage name.
//!
//! Writes go to a temp file in the same directory and are renamed into
//! place, so a crash never leaves a half-written value behind.

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use metastream_core::visibility::StoragePort;

pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    /// Storage rooted at `dir`. The directory is created on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, name: &str) -> Result<PathBuf> {
        let valid = !name.is_empty()
            && name != "."
            && name != ".."
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'));
        if !valid {
            bail!("invalid storage name: '{}'", name);
        }
        Ok(self.dir.join(format!("{}.json", name)))
    }
}

impl StoragePort for FileStorage {
    fn read(&self, name: &str) -> Result<Option<String>> {
        let path = self.path_for(name)?;
        match std::fs::read_to_string(&path) {
            Ok(s) => Ok(Some(s)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("Failed to read {}", path.display())),
        }
    }

    fn write(&self, name: &str, value: &str) -> Result<()> {
        let path = self.path_for(name)?;
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create {}", self.dir.display()))?;

        let tmp = path.with_extension(format!("json.tmp-{}", std::process::id()));
        {
            let mut f = std::fs::File::create(&tmp)
                .with_context(|| format!("Failed to create {}", tmp.display()))?;
            f.write_all(value.as_bytes())?;
            f.sync_all()?;
        }
        std::fs::rename(&tmp, &path)
            .with_context(|| format!("Failed to replace {}", path.display()))?;
        Ok(())
    }

    fn remove(&self, name: &str) -> Result<()> {
        let path = self.path_for(name)?;
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("Failed to remove {}", path.display())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use metastream_core::visibility::{VisibilityKey, VisibilityStore};

    #[test]
    fn read_write_remove() {
        let tmp = tempfile::TempDir::new().unwrap();
        let storage = FileStorage::new(tmp.path().join("nested"));
        assert_eq!(storage.read("a.b").unwrap(), None);

        storage.write("a.b", "[1]").unwrap();
        assert_eq!(storage.read("a.b").unwrap().as_deref(), Some("[1]"));
        storage.write("a.b", "[2]").unwrap();
        assert_eq!(storage.read("a.b").unwrap().as_deref(), Some("[2]"));

        storage.remove("a.b").unwrap();
        storage.remove("a.b").unwrap();
        assert_eq!(storage.read("a.b").unwrap(), None);

        let leftovers: Vec<_> = std::fs::read_dir(storage.dir()).unwrap().collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn rejects_path_like_names() {
        let tmp = tempfile::TempDir::new().unwrap();
        let storage = FileStorage::new(tmp.path());
        assert!(storage.write("../escape", "x").is_err());
        assert!(storage.read("a/b").is_err());
        assert!(storage.read("").is_err());
    }

    #[test]
    fn hidden_keys_survive_a_restart() {
        let tmp = tempfile::TempDir::new().unwrap();
        let key = VisibilityKey::new("foods.csv", "foods.csv#full");
        VisibilityStore::new(FileStorage::new(tmp.path()))
            .hide(&key)
            .unwrap();

        let reopened = VisibilityStore::new(FileStorage::new(tmp.path()));
        assert!(reopened.is_hidden(&key));
        assert_eq!(reopened.list_hidden(), vec!["foods.csv::foods.csv#full"]);
    }
}
