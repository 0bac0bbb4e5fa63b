//! Byte-level key/value storage underneath the object store.

use crate::error::{Error, Result};
use std::io::Write;
use std::path::PathBuf;

/// File holding an object's encoded bytes inside its key directory.
pub const METADATA_FILE: &str = "metadata.json";

/// Raw key/value byte store.
///
/// Keys are path-like strings such as `/vm/0123456789abcdef`. The store
/// knows nothing about what the bytes mean.
pub trait RawStorage: Send + Sync {
    /// Read the bytes at `key`.
    fn read(&self, key: &str) -> Result<Vec<u8>>;

    /// Write `content` at `key`, replacing what was there.
    fn write(&self, key: &str, content: &[u8]) -> Result<()>;

    /// Remove `key`.
    fn delete(&self, key: &str) -> Result<()>;

    /// List the keys directly under `prefix`.
    ///
    /// A listed key is not guaranteed to have content; check with
    /// [`RawStorage::exists`].
    fn list(&self, prefix: &str) -> Result<Vec<String>>;

    /// Whether `key` has content.
    fn exists(&self, key: &str) -> bool;
}

/// Raw storage on a plain directory tree.
///
/// `/vm/<uid>` is stored at `<root>/vm/<uid>/metadata.json`, so every
/// object gets its own directory that can also hold runtime files.
#[derive(Debug, Clone)]
pub struct FilesystemRawStorage {
    root: PathBuf,
}

impl FilesystemRawStorage {
    /// Create a store rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn dir_path(&self, key: &str) -> Result<PathBuf> {
        let relative = key.strip_prefix('/').unwrap_or(key);
        let mut path = self.root.clone();
        for component in relative.split('/') {
            if component.is_empty() || component == "." || component == ".." {
                return Err(Error::InvalidKey(key.to_string()));
            }
            path.push(component);
        }
        Ok(path)
    }

    fn file_path(&self, key: &str) -> Result<PathBuf> {
        Ok(self.dir_path(key)?.join(METADATA_FILE))
    }
}

impl RawStorage for FilesystemRawStorage {
    fn read(&self, key: &str) -> Result<Vec<u8>> {
        let path = self.file_path(key)?;
        match std::fs::read(&path) {
            Ok(content) => Ok(content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(Error::not_found(key)),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&self, key: &str, content: &[u8]) -> Result<()> {
        let dir = self.dir_path(key)?;
        std::fs::create_dir_all(&dir)?;

        // Write to a sibling temp file and rename so readers never see a
        // half-written object.
        let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
        tmp.write_all(content)?;
        tmp.as_file().sync_all()?;
        tmp.persist(dir.join(METADATA_FILE))
            .map_err(|e| Error::Io(e.error))?;

        tracing::trace!(key = %key, bytes = content.len(), "wrote raw entry");
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        if !self.exists(key) {
            return Err(Error::not_found(key));
        }
        std::fs::remove_dir_all(self.dir_path(key)?)?;
        tracing::trace!(key = %key, "deleted raw entry");
        Ok(())
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let dir = self.dir_path(prefix)?;
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let prefix = prefix.trim_end_matches('/');
        let mut keys = Vec::new();
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            keys.push(format!("{}/{}", prefix, entry.file_name().to_string_lossy()));
        }
        keys.sort();
        Ok(keys)
    }

    fn exists(&self, key: &str) -> bool {
        self.file_path(key).map(|p| p.is_file()).unwrap_or(false)
    }
}
