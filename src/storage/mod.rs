//! Persistent object storage.
//!
//! [`GenericStorage`] stores typed API objects of any registered kind on
//! top of a [`RawStorage`] byte store. Objects live at
//! `/<lower(kind)>/<uid>`; updates that should not clobber concurrent
//! changes to other fields go through [`Storage::patch`].

mod client;
pub mod raw;

pub use client::{Client, TypedClient};
pub use raw::{FilesystemRawStorage, RawStorage};

use crate::apis::{ApiObject, ApiType, GroupVersionKind, Object, Uid};
use crate::error::{Error, Result};
use crate::patch;
use crate::scheme::Serializer;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// Persists and retrieves API objects of every registered kind.
pub trait Storage: Send + Sync {
    /// Create a defaulted, empty object of a kind.
    fn new_object(&self, gvk: &GroupVersionKind) -> Result<Object>;

    /// Read the object with `uid`.
    fn get(&self, gvk: &GroupVersionKind, uid: &Uid) -> Result<Object>;

    /// Write an object, replacing any previous content.
    ///
    /// Timestamps are the caller's responsibility.
    fn set(&self, gvk: &GroupVersionKind, obj: &Object) -> Result<()>;

    /// Merge-patch the stored object with `uid`.
    fn patch(&self, gvk: &GroupVersionKind, uid: &Uid, patch: &[u8]) -> Result<()>;

    /// Remove the object with `uid`.
    fn delete(&self, gvk: &GroupVersionKind, uid: &Uid) -> Result<()>;

    /// Read every object of a kind.
    fn list(&self, gvk: &GroupVersionKind) -> Result<Vec<Object>>;

    /// Read only the identity metadata of every object of a kind.
    fn list_meta(&self, gvk: &GroupVersionKind) -> Result<Vec<ApiType>>;

    /// Number of raw entries stored for a kind.
    fn count(&self, gvk: &GroupVersionKind) -> Result<u64>;
}

/// Storage key of one object.
pub fn key_for_uid(gvk: &GroupVersionKind, uid: &Uid) -> String {
    format!("/{}/{}", gvk.kind.lower(), uid)
}

/// Storage key of one object, refusing UIDs that are not a single valid
/// key component.
fn checked_key(gvk: &GroupVersionKind, uid: &Uid) -> Result<String> {
    Uid::parse(uid.as_str())?;
    Ok(key_for_uid(gvk, uid))
}

/// Storage key prefix of a kind.
pub fn key_for_kind(gvk: &GroupVersionKind) -> String {
    format!("/{}", gvk.kind.lower())
}

/// Per-key mutexes serializing writers of the same object.
///
/// Entries nobody holds are dropped on the next lookup, so the map only
/// grows with the number of keys in use at once.
#[derive(Default)]
struct KeyLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl KeyLocks {
    fn for_key(&self, key: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock();
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        Arc::clone(locks.entry(key.to_string()).or_default())
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.locks.lock().len()
    }
}

/// [`Storage`] over any [`RawStorage`], encoding objects as JSON.
pub struct GenericStorage {
    raw: Box<dyn RawStorage>,
    serializer: Serializer,
    locks: KeyLocks,
}

impl GenericStorage {
    /// Create a storage over `raw` using `serializer` for the encoding.
    pub fn new(raw: impl RawStorage + 'static, serializer: Serializer) -> Self {
        Self {
            raw: Box::new(raw),
            serializer,
            locks: KeyLocks::default(),
        }
    }

    /// The serializer objects are encoded with.
    pub fn serializer(&self) -> &Serializer {
        &self.serializer
    }

    fn ensure_known(&self, gvk: &GroupVersionKind) -> Result<()> {
        if self.serializer.scheme().recognizes(gvk) {
            Ok(())
        } else {
            Err(Error::UnknownKind(gvk.to_string()))
        }
    }

    fn decode(&self, content: &[u8], gvk: &GroupVersionKind) -> Result<Object> {
        let mut obj = self.serializer.decode(content, gvk.is_internal())?;
        if obj.kind_name() != gvk.kind.as_str() {
            return Err(Error::Decode(format!(
                "expected a {}, found a {}",
                gvk.kind,
                obj.kind_name()
            )));
        }
        // Callers asking for a specific version get exactly that stamped,
        // whatever the content said.
        obj.set_group_version_kind(gvk);
        Ok(obj)
    }

    /// Visit the content of every entry under a kind's prefix, skipping
    /// entries whose directory exists without content.
    fn walk_kind<F>(&self, gvk: &GroupVersionKind, mut visit: F) -> Result<()>
    where
        F: FnMut(&[u8]) -> Result<()>,
    {
        for key in self.raw.list(&key_for_kind(gvk))? {
            if !self.raw.exists(&key) {
                tracing::debug!(key = %key, "skipping entry without content");
                continue;
            }
            let content = self.raw.read(&key)?;
            visit(&content)?;
        }
        Ok(())
    }
}

impl Storage for GenericStorage {
    fn new_object(&self, gvk: &GroupVersionKind) -> Result<Object> {
        let mut obj = self.serializer.scheme().new_object(gvk)?;

        if gvk.is_internal() {
            self.serializer.default_internal(&mut obj)?;
        } else {
            self.serializer.scheme().default_object(&mut obj);
        }

        obj.set_group_version_kind(gvk);
        Ok(obj)
    }

    fn get(&self, gvk: &GroupVersionKind, uid: &Uid) -> Result<Object> {
        self.ensure_known(gvk)?;
        let content = self.raw.read(&checked_key(gvk, uid)?)?;
        self.decode(&content, gvk)
    }

    fn set(&self, gvk: &GroupVersionKind, obj: &Object) -> Result<()> {
        self.ensure_known(gvk)?;
        if obj.kind_name() != gvk.kind.as_str() {
            return Err(Error::Encode(format!(
                "cannot store a {} as {}",
                obj.kind_name(),
                gvk.kind
            )));
        }
        let key = checked_key(gvk, obj.uid())?;
        let content = self.serializer.encode_json(obj)?;
        let lock = self.locks.for_key(&key);
        let _guard = lock.lock();
        self.raw.write(&key, &content)
    }

    fn patch(&self, gvk: &GroupVersionKind, uid: &Uid, patch: &[u8]) -> Result<()> {
        self.ensure_known(gvk)?;
        let key = checked_key(gvk, uid)?;

        // Hold the key across read-modify-write so concurrent patchers of
        // the same object in this process apply one after the other.
        let lock = self.locks.for_key(&key);
        let _guard = lock.lock();

        let current = self.raw.read(&key)?;
        let updated = patch::apply(&self.serializer, &current, patch, gvk).map_err(|e| match e {
            Error::PatchConflict { message, .. } => Error::patch_conflict(&key, message),
            other => other,
        })?;
        self.raw.write(&key, &updated)?;

        tracing::debug!(key = %key, "patched object");
        Ok(())
    }

    fn delete(&self, gvk: &GroupVersionKind, uid: &Uid) -> Result<()> {
        self.ensure_known(gvk)?;
        let key = checked_key(gvk, uid)?;
        let lock = self.locks.for_key(&key);
        let _guard = lock.lock();
        self.raw.delete(&key)
    }

    fn list(&self, gvk: &GroupVersionKind) -> Result<Vec<Object>> {
        self.ensure_known(gvk)?;
        let mut objects = Vec::new();
        self.walk_kind(gvk, |content| {
            objects.push(self.decode(content, gvk)?);
            Ok(())
        })?;
        Ok(objects)
    }

    fn list_meta(&self, gvk: &GroupVersionKind) -> Result<Vec<ApiType>> {
        self.ensure_known(gvk)?;
        let mut metas = Vec::new();
        self.walk_kind(gvk, |content| {
            let mut meta: ApiType = serde_json::from_slice(content)?;
            meta.set_group_version_kind(gvk);
            metas.push(meta);
            Ok(())
        })?;
        Ok(metas)
    }

    fn count(&self, gvk: &GroupVersionKind) -> Result<u64> {
        self.ensure_known(gvk)?;
        Ok(self.raw.list(&key_for_kind(gvk))?.len() as u64)
    }
}
