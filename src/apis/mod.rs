//! Typed API objects.
//!
//! Every persisted object is one of a closed set of kinds ([`Vm`],
//! [`Image`], [`Kernel`]). Code that does not care which kind it holds
//! works with [`Object`] through the [`ApiObject`] trait; code that does
//! uses the concrete type through [`Resource`].

pub mod image;
pub mod meta;
pub mod vm;

use crate::error::{Error, Result};
pub use image::{
    Image, ImageSourceType, ImageSpec, ImageStatus, Kernel, KernelSpec, KernelStatus,
    OciImageClaim, OciImageSource,
};
pub use meta::{ApiType, GroupVersionKind, Kind, ObjectMeta, TypeMeta, Uid};
use serde::de::DeserializeOwned;
use serde::Serialize;
pub use vm::{PortMapping, Vm, VmSpec, VmState, VmStatus};

/// Identity accessors shared by every kind.
pub trait ApiObject {
    /// Kind and apiVersion currently stamped on the object.
    fn type_meta(&self) -> TypeMeta;

    /// Stamp a GVK onto the object.
    fn set_group_version_kind(&mut self, gvk: &GroupVersionKind);

    /// Identity metadata.
    fn metadata(&self) -> &ObjectMeta;

    /// Mutable identity metadata.
    fn metadata_mut(&mut self) -> &mut ObjectMeta;

    /// UID of the object.
    fn uid(&self) -> &Uid {
        &self.metadata().uid
    }

    /// Name of the object.
    fn name(&self) -> &str {
        &self.metadata().name
    }

    /// GVK stamped on the object, if any.
    fn group_version_kind(&self) -> Option<GroupVersionKind> {
        self.type_meta().group_version_kind()
    }
}

/// A concrete kind with typed spec and status.
pub trait Resource:
    ApiObject + Clone + Default + Serialize + DeserializeOwned + Into<Object> + TryFrom<Object, Error = Error>
{
    /// Kind name, e.g. `VM`.
    const KIND: &'static str;

    /// Fill unset fields with kind-specific defaults.
    fn set_defaults(&mut self);

    /// Internal GVK of this kind.
    fn internal_gvk() -> GroupVersionKind {
        GroupVersionKind::internal(Self::KIND)
    }
}

/// Any API object.
#[derive(Debug, Clone, PartialEq)]
pub enum Object {
    /// A micro-VM.
    Vm(Vm),
    /// A root filesystem image.
    Image(Image),
    /// A guest kernel.
    Kernel(Kernel),
}

impl Object {
    /// Kind name of the held object.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Object::Vm(_) => Vm::KIND,
            Object::Image(_) => Image::KIND,
            Object::Kernel(_) => Kernel::KIND,
        }
    }

    /// Encode the object as a JSON value.
    pub fn to_value(&self) -> Result<serde_json::Value> {
        let value = match self {
            Object::Vm(o) => serde_json::to_value(o),
            Object::Image(o) => serde_json::to_value(o),
            Object::Kernel(o) => serde_json::to_value(o),
        };
        value.map_err(|e| Error::Encode(e.to_string()))
    }

    /// Apply the held kind's defaulting.
    pub fn set_defaults(&mut self) {
        match self {
            Object::Vm(o) => o.set_defaults(),
            Object::Image(o) => o.set_defaults(),
            Object::Kernel(o) => o.set_defaults(),
        }
    }

    /// Downcast into a concrete kind.
    pub fn into_resource<R: Resource>(self) -> Result<R> {
        R::try_from(self)
    }
}

macro_rules! delegate {
    ($obj:expr, $o:ident => $e:expr) => {
        match $obj {
            Object::Vm($o) => $e,
            Object::Image($o) => $e,
            Object::Kernel($o) => $e,
        }
    };
}

impl ApiObject for Object {
    fn type_meta(&self) -> TypeMeta {
        delegate!(self, o => o.type_meta())
    }

    fn set_group_version_kind(&mut self, gvk: &GroupVersionKind) {
        delegate!(self, o => o.set_group_version_kind(gvk))
    }

    fn metadata(&self) -> &ObjectMeta {
        delegate!(self, o => o.metadata())
    }

    fn metadata_mut(&mut self) -> &mut ObjectMeta {
        delegate!(self, o => o.metadata_mut())
    }
}

/// Implements [`ApiObject`], [`Resource`] and the [`Object`] conversions
/// for a kind struct with `kind`, `api_version`, `metadata`, `spec` and
/// `status` fields.
macro_rules! impl_resource {
    ($ty:ident, $kind:expr, $defaults:expr) => {
        impl ApiObject for $ty {
            fn type_meta(&self) -> TypeMeta {
                TypeMeta {
                    kind: self.kind.clone(),
                    api_version: self.api_version.clone(),
                }
            }

            fn set_group_version_kind(&mut self, gvk: &GroupVersionKind) {
                self.kind = gvk.kind.as_str().to_string();
                self.api_version = gvk.api_version();
            }

            fn metadata(&self) -> &ObjectMeta {
                &self.metadata
            }

            fn metadata_mut(&mut self) -> &mut ObjectMeta {
                &mut self.metadata
            }
        }

        impl Resource for $ty {
            const KIND: &'static str = $kind;
            fn set_defaults(&mut self) {
                let defaults: fn(&mut $ty) = $defaults;
                defaults(self)
            }
        }

        impl From<$ty> for Object {
            fn from(o: $ty) -> Self {
                Object::$ty(o)
            }
        }

        impl TryFrom<Object> for $ty {
            type Error = Error;

            fn try_from(obj: Object) -> Result<Self> {
                match obj {
                    Object::$ty(o) => Ok(o),
                    other => Err(Error::Decode(format!(
                        "expected kind {}, got {}",
                        $kind,
                        other.kind_name()
                    ))),
                }
            }
        }
    };
}

impl_resource!(Vm, crate::constants::VM_KIND, Vm::set_defaults);
impl_resource!(Image, crate::constants::IMAGE_KIND, |_| {});
impl_resource!(Kernel, crate::constants::KERNEL_KIND, |_| {});
