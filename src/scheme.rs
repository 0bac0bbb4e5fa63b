//! Kind registry and JSON serializer.
//!
//! The [`Scheme`] is a static registry from kind names to constructors,
//! decoders and defaulters. The [`Serializer`] turns objects into the
//! external JSON representation and back, applying defaulting on the way
//! in.

use crate::apis::{
    ApiObject, GroupVersionKind, Image, Kernel, Object, Resource, TypeMeta, Vm,
};
use crate::apis::meta::{GROUP, VERSION_INTERNAL, VERSION_V1ALPHA1};
use crate::error::{Error, Result};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;

/// Per-kind entry points.
#[derive(Clone, Copy)]
struct KindEntry {
    new: fn() -> Object,
    decode: fn(Value) -> Result<Object>,
}

fn new_of<R: Resource>() -> Object {
    R::default().into()
}

fn decode_of<R: Resource>(value: Value) -> Result<Object> {
    let obj: R = serde_json::from_value(value)?;
    Ok(obj.into())
}

/// Registry of known kinds.
#[derive(Clone, Default)]
pub struct Scheme {
    kinds: HashMap<String, KindEntry>,
}

impl std::fmt::Debug for Scheme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut kinds: Vec<_> = self.kinds.keys().collect();
        kinds.sort();
        f.debug_struct("Scheme").field("kinds", &kinds).finish()
    }
}

impl Scheme {
    /// Create an empty scheme.
    pub fn new() -> Self {
        Self::default()
    }

    /// Scheme with the VM, Image and Kernel kinds registered.
    pub fn ignite() -> Self {
        let mut scheme = Self::new();
        scheme.register::<Vm>();
        scheme.register::<Image>();
        scheme.register::<Kernel>();
        scheme
    }

    /// Register a kind.
    pub fn register<R: Resource>(&mut self) {
        self.kinds.insert(
            R::KIND.to_string(),
            KindEntry {
                new: new_of::<R>,
                decode: decode_of::<R>,
            },
        );
    }

    /// Check whether the scheme can handle a GVK.
    pub fn recognizes(&self, gvk: &GroupVersionKind) -> bool {
        self.entry(gvk).is_ok()
    }

    fn entry(&self, gvk: &GroupVersionKind) -> Result<KindEntry> {
        let known_version = gvk.is_internal() || gvk.version == VERSION_V1ALPHA1;
        if gvk.group != GROUP || !known_version {
            return Err(Error::UnknownKind(gvk.to_string()));
        }
        self.kinds
            .get(gvk.kind.as_str())
            .copied()
            .ok_or_else(|| Error::UnknownKind(gvk.to_string()))
    }

    /// Create a zero-value object of a kind.
    pub fn new_object(&self, gvk: &GroupVersionKind) -> Result<Object> {
        let entry = self.entry(gvk)?;
        Ok((entry.new)())
    }

    /// Apply the kind's defaulting functions.
    pub fn default_object(&self, obj: &mut Object) {
        obj.set_defaults();
    }

    fn decode_value(&self, gvk: &GroupVersionKind, value: Value) -> Result<Object> {
        let entry = self.entry(gvk)?;
        (entry.decode)(value)
    }
}

/// Encodes and decodes objects in their external JSON form.
#[derive(Debug, Clone)]
pub struct Serializer {
    scheme: Scheme,
}

impl Serializer {
    /// Create a serializer over a scheme.
    pub fn new(scheme: Scheme) -> Self {
        Self { scheme }
    }

    /// The underlying kind registry.
    pub fn scheme(&self) -> &Scheme {
        &self.scheme
    }

    /// Encode an object as external (`v1alpha1`) JSON.
    pub fn encode_json(&self, obj: &Object) -> Result<Vec<u8>> {
        let gvk = GroupVersionKind::v1alpha1(obj.kind_name());
        let mut value = obj.to_value()?;
        if let Some(map) = value.as_object_mut() {
            map.insert("kind".into(), Value::String(gvk.kind.to_string()));
            map.insert("apiVersion".into(), Value::String(gvk.api_version()));
        }
        serde_json::to_vec_pretty(&value).map_err(|e| Error::Encode(e.to_string()))
    }

    /// Decode stored JSON into an object.
    ///
    /// The content must carry a recognized `kind` and `apiVersion`. The
    /// decoded object is defaulted; when `internal` is set it is stamped
    /// with the internal version of its kind, otherwise with the version
    /// found in the content.
    pub fn decode(&self, content: &[u8], internal: bool) -> Result<Object> {
        let value: Value = serde_json::from_slice(content)?;
        let type_meta = TypeMeta::deserialize(&value)?;
        let gvk = type_meta.group_version_kind().ok_or_else(|| {
            Error::Decode(format!(
                "object has no valid apiVersion: {:?}",
                type_meta.api_version
            ))
        })?;

        let mut obj = self.scheme.decode_value(&gvk, value)?;
        self.scheme.default_object(&mut obj);

        if internal {
            obj.set_group_version_kind(&gvk.with_version(VERSION_INTERNAL));
        } else {
            obj.set_group_version_kind(&gvk);
        }
        Ok(obj)
    }

    /// Default an internal object by converting it to the external form,
    /// running the external defaulting and converting back.
    pub fn default_internal(&self, obj: &mut Object) -> Result<()> {
        let gvk = obj.group_version_kind();
        let encoded = self.encode_json(obj)?;
        let mut defaulted = self.decode(&encoded, true)?;
        if let Some(gvk) = gvk {
            defaulted.set_group_version_kind(&gvk);
        }
        *obj = defaulted;
        Ok(())
    }
}

impl Default for Serializer {
    fn default() -> Self {
        Self::new(Scheme::ignite())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apis::{Uid, VmState};
    use crate::constants;

    #[test]
    fn test_new_object_for_registered_kinds() {
        let scheme = Scheme::ignite();
        for kind in ["VM", "Image", "Kernel"] {
            let obj = scheme.new_object(&GroupVersionKind::internal(kind)).unwrap();
            assert_eq!(obj.kind_name(), kind);
        }
    }

    #[test]
    fn test_unknown_kind_is_rejected() {
        let scheme = Scheme::ignite();
        let err = scheme
            .new_object(&GroupVersionKind::v1alpha1("Pool"))
            .unwrap_err();
        assert!(matches!(err, Error::UnknownKind(_)));

        let mut wrong_group = GroupVersionKind::v1alpha1("VM");
        wrong_group.group = "example.com".into();
        assert!(!scheme.recognizes(&wrong_group));
        assert!(!scheme.recognizes(&GroupVersionKind::new("v2", "VM")));
    }

    #[test]
    fn test_encode_stamps_external_version() {
        let serializer = Serializer::default();
        let mut vm = Vm::default();
        vm.metadata.uid = Uid::new("abc");
        vm.set_group_version_kind(&GroupVersionKind::internal("VM"));

        let bytes = serializer.encode_json(&vm.into()).unwrap();
        let value: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["kind"], "VM");
        assert_eq!(value["apiVersion"], "ignite.weave.works/v1alpha1");
        assert_eq!(value["metadata"]["uid"], "abc");
    }

    #[test]
    fn test_decode_applies_defaults_and_stamps_version() {
        let serializer = Serializer::default();
        let content = br#"{
            "kind": "VM",
            "apiVersion": "ignite.weave.works/v1alpha1",
            "metadata": {"uid": "abc"},
            "spec": {"cpus": 2}
        }"#;

        let external = serializer.decode(content, false).unwrap();
        assert_eq!(
            external.type_meta().api_version,
            "ignite.weave.works/v1alpha1"
        );

        let internal = serializer.decode(content, true).unwrap();
        assert!(internal.group_version_kind().unwrap().is_internal());
        let vm: Vm = internal.into_resource().unwrap();
        assert_eq!(vm.spec.cpus, 2);
        assert_eq!(vm.spec.memory, constants::VM_DEFAULT_MEMORY_MIB);
        assert_eq!(vm.status.state, VmState::Created);
    }

    #[test]
    fn test_decode_errors() {
        let serializer = Serializer::default();
        assert!(matches!(
            serializer.decode(b"not json", false),
            Err(Error::Decode(_))
        ));
        assert!(matches!(
            serializer.decode(br#"{"kind": "VM"}"#, false),
            Err(Error::Decode(_))
        ));
        assert!(matches!(
            serializer.decode(
                br#"{"kind": "Pool", "apiVersion": "ignite.weave.works/v1alpha1"}"#,
                false
            ),
            Err(Error::UnknownKind(_))
        ));
        assert!(matches!(
            serializer.decode(
                br#"{"kind": "VM", "apiVersion": "ignite.weave.works/v1alpha1", "spec": {"gpus": 1}}"#,
                false
            ),
            Err(Error::Decode(_))
        ));
    }

    #[test]
    fn test_default_internal_keeps_requested_gvk() {
        let serializer = Serializer::default();
        let gvk = GroupVersionKind::internal("VM");
        let mut obj = serializer.scheme().new_object(&gvk).unwrap();
        obj.set_group_version_kind(&gvk);

        serializer.default_internal(&mut obj).unwrap();
        assert_eq!(obj.group_version_kind(), Some(gvk));
        let vm: Vm = obj.into_resource().unwrap();
        assert_eq!(vm.spec.cpus, constants::VM_DEFAULT_CPUS);
    }
}
