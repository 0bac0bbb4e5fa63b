//! Typed access to the object store.

use super::Storage;
use crate::apis::{ApiType, Image, Kernel, Resource, Uid, Vm};
use crate::error::Result;
use std::marker::PhantomData;
use std::sync::Arc;

/// Entry point for typed object access.
#[derive(Clone)]
pub struct Client {
    storage: Arc<dyn Storage>,
}

impl Client {
    /// Create a client over a storage.
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// VM objects.
    pub fn vms(&self) -> TypedClient<'_, Vm> {
        TypedClient::new(self.storage.as_ref())
    }

    /// Image objects.
    pub fn images(&self) -> TypedClient<'_, Image> {
        TypedClient::new(self.storage.as_ref())
    }

    /// Kernel objects.
    pub fn kernels(&self) -> TypedClient<'_, Kernel> {
        TypedClient::new(self.storage.as_ref())
    }
}

/// Access to the objects of one kind, always in the internal version.
pub struct TypedClient<'a, R> {
    storage: &'a dyn Storage,
    _kind: PhantomData<R>,
}

impl<'a, R: Resource> TypedClient<'a, R> {
    fn new(storage: &'a dyn Storage) -> Self {
        Self {
            storage,
            _kind: PhantomData,
        }
    }

    /// Read one object.
    pub fn get(&self, uid: &Uid) -> Result<R> {
        self.storage.get(&R::internal_gvk(), uid)?.into_resource()
    }

    /// Write an object, stamping its creation time on first write.
    pub fn set(&self, obj: &mut R) -> Result<()> {
        if obj.metadata().created.is_none() {
            obj.metadata_mut().created = Some(chrono::Utc::now());
        }
        let gvk = R::internal_gvk();
        obj.set_group_version_kind(&gvk);
        self.storage.set(&gvk, &obj.clone().into())
    }

    /// Merge-patch one object.
    pub fn patch(&self, uid: &Uid, patch: &[u8]) -> Result<()> {
        self.storage.patch(&R::internal_gvk(), uid, patch)
    }

    /// Remove one object.
    pub fn delete(&self, uid: &Uid) -> Result<()> {
        self.storage.delete(&R::internal_gvk(), uid)
    }

    /// Read every object of the kind.
    pub fn list(&self) -> Result<Vec<R>> {
        self.storage
            .list(&R::internal_gvk())?
            .into_iter()
            .map(|obj| obj.into_resource())
            .collect()
    }

    /// Read the identity metadata of every object of the kind.
    pub fn list_meta(&self) -> Result<Vec<ApiType>> {
        self.storage.list_meta(&R::internal_gvk())
    }
}
