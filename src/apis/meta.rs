//! Object identity and metadata shared by all API kinds.

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// API group all ignite kinds belong to.
pub const GROUP: &str = "ignite.weave.works";

/// Versioned (external) representation written to storage.
pub const VERSION_V1ALPHA1: &str = "v1alpha1";

/// Canonical in-memory representation.
pub const VERSION_INTERNAL: &str = "__internal";

/// Unique identifier for one object within its kind.
///
/// A UID is made of ASCII alphanumerics, dashes and underscores, so it is
/// always a single storage key component. Decoding rejects anything else.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Uid(String);

impl Uid {
    /// Wrap a string as a UID without checking it.
    pub fn new(uid: impl Into<String>) -> Self {
        Self(uid.into())
    }

    /// Parse a non-empty UID, rejecting characters that are not allowed.
    pub fn parse(uid: impl Into<String>) -> Result<Self> {
        let uid = Self::try_from(uid.into())?;
        if uid.is_empty() {
            return Err(Error::InvalidKey(String::new()));
        }
        Ok(uid)
    }

    /// Get the UID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Check if the UID is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl TryFrom<String> for Uid {
    type Error = Error;

    /// Empty input gives the unset UID.
    fn try_from(uid: String) -> Result<Self> {
        if uid
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            Ok(Self(uid))
        } else {
            Err(Error::InvalidKey(uid))
        }
    }
}

impl From<Uid> for String {
    fn from(uid: Uid) -> Self {
        uid.0
    }
}

impl std::fmt::Display for Uid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Name of a persisted object type, e.g. `VM`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Kind(String);

impl Kind {
    /// Create a kind from its name.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Get the kind name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Lower-cased form used for storage keys and data directories.
    pub fn lower(&self) -> String {
        self.0.to_lowercase()
    }
}

impl std::fmt::Display for Kind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Fully qualified type of an object: group, version and kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GroupVersionKind {
    /// API group.
    pub group: String,
    /// API version, or [`VERSION_INTERNAL`].
    pub version: String,
    /// Kind name.
    pub kind: Kind,
}

impl GroupVersionKind {
    /// Create a GVK in the ignite group.
    pub fn new(version: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            group: GROUP.to_string(),
            version: version.into(),
            kind: Kind::new(kind),
        }
    }

    /// Internal representation of a kind.
    pub fn internal(kind: impl Into<String>) -> Self {
        Self::new(VERSION_INTERNAL, kind)
    }

    /// External `v1alpha1` representation of a kind.
    pub fn v1alpha1(kind: impl Into<String>) -> Self {
        Self::new(VERSION_V1ALPHA1, kind)
    }

    /// Whether this refers to the internal representation.
    pub fn is_internal(&self) -> bool {
        self.version == VERSION_INTERNAL
    }

    /// `group/version` string as written in `apiVersion`.
    pub fn api_version(&self) -> String {
        format!("{}/{}", self.group, self.version)
    }

    /// Same kind with a different version.
    pub fn with_version(&self, version: impl Into<String>) -> Self {
        Self {
            group: self.group.clone(),
            version: version.into(),
            kind: self.kind.clone(),
        }
    }
}

impl std::fmt::Display for GroupVersionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}, Kind={}", self.api_version(), self.kind)
    }
}

/// Kind and apiVersion header present on every stored document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeMeta {
    /// Kind name.
    #[serde(default)]
    pub kind: String,
    /// `group/version`.
    #[serde(default)]
    pub api_version: String,
}

impl TypeMeta {
    /// Stamp a GVK onto this header.
    pub fn set_group_version_kind(&mut self, gvk: &GroupVersionKind) {
        self.kind = gvk.kind.as_str().to_string();
        self.api_version = gvk.api_version();
    }

    /// Parse the header back into a GVK.
    ///
    /// Returns `None` when `apiVersion` is not of the form `group/version`.
    pub fn group_version_kind(&self) -> Option<GroupVersionKind> {
        let (group, version) = self.api_version.split_once('/')?;
        Some(GroupVersionKind {
            group: group.to_string(),
            version: version.to_string(),
            kind: Kind::new(self.kind.clone()),
        })
    }
}

/// Identity metadata of an object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ObjectMeta {
    /// Human readable name.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,

    /// Unique identifier within the kind.
    #[serde(default, skip_serializing_if = "Uid::is_empty")]
    pub uid: Uid,

    /// Creation time. Filled by the typed client on first write.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<DateTime<Utc>>,
}

/// Only the identity part of a stored object.
///
/// Deserializing into this type skips over `spec` and `status` without
/// building them, which keeps enumeration cheap.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiType {
    /// Kind name.
    #[serde(default)]
    pub kind: String,
    /// `group/version`.
    #[serde(default)]
    pub api_version: String,
    /// Identity metadata.
    #[serde(default)]
    pub metadata: ApiTypeMeta,
}

/// Lenient variant of [`ObjectMeta`] used by [`ApiType`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiTypeMeta {
    /// Object name.
    #[serde(default)]
    pub name: String,
    /// Object UID.
    #[serde(default)]
    pub uid: Uid,
    /// Creation time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<DateTime<Utc>>,
}

impl ApiType {
    /// Stamp a GVK onto this header.
    pub fn set_group_version_kind(&mut self, gvk: &GroupVersionKind) {
        self.kind = gvk.kind.as_str().to_string();
        self.api_version = gvk.api_version();
    }

    /// UID of the described object.
    pub fn uid(&self) -> &Uid {
        &self.metadata.uid
    }

    /// Name of the described object.
    pub fn name(&self) -> &str {
        &self.metadata.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uid_parse_keeps_input() {
        assert_eq!(Uid::parse("abc-123_x").unwrap().as_str(), "abc-123_x");
        assert_ne!(Uid::parse("web1").unwrap(), Uid::new("web.1"));
    }

    #[test]
    fn test_uid_parse_rejects_invalid() {
        for bad in ["web.1", "../../etc", "a/b", "a b", ""] {
            let err = Uid::parse(bad).unwrap_err();
            assert!(matches!(err, Error::InvalidKey(_)), "{:?}: {:?}", bad, err);
        }
    }

    #[test]
    fn test_uid_decoding_is_checked() {
        assert_eq!(
            serde_json::from_str::<Uid>("\"abc\"").unwrap(),
            Uid::new("abc")
        );
        assert_eq!(serde_json::from_str::<Uid>("\"\"").unwrap(), Uid::default());
        assert!(serde_json::from_str::<Uid>("\"web.1\"").is_err());
        assert_eq!(serde_json::to_string(&Uid::new("abc")).unwrap(), "\"abc\"");
    }

    #[test]
    fn test_object_meta_with_invalid_uid_is_rejected() {
        let json = r#"{"name": "web", "uid": "../vm"}"#;
        assert!(serde_json::from_str::<ObjectMeta>(json).is_err());
    }

    #[test]
    fn test_kind_lower() {
        assert_eq!(Kind::new("VM").lower(), "vm");
        assert_eq!(Kind::new("Kernel").lower(), "kernel");
    }

    #[test]
    fn test_gvk_api_version_and_internal() {
        let gvk = GroupVersionKind::v1alpha1("VM");
        assert_eq!(gvk.api_version(), "ignite.weave.works/v1alpha1");
        assert!(!gvk.is_internal());
        assert!(gvk.with_version(VERSION_INTERNAL).is_internal());
    }

    #[test]
    fn test_type_meta_round_trips_gvk() {
        let gvk = GroupVersionKind::internal("Image");
        let mut tm = TypeMeta::default();
        tm.set_group_version_kind(&gvk);
        assert_eq!(tm.kind, "Image");
        assert_eq!(tm.group_version_kind(), Some(gvk));
    }

    #[test]
    fn test_type_meta_without_group_has_no_gvk() {
        let tm = TypeMeta {
            kind: "VM".into(),
            api_version: "v1".into(),
        };
        assert!(tm.group_version_kind().is_none());
    }

    #[test]
    fn test_api_type_ignores_spec_and_status() {
        let json = r#"{
            "kind": "VM",
            "apiVersion": "ignite.weave.works/v1alpha1",
            "metadata": {"name": "web", "uid": "0123456789abcdef"},
            "spec": {"cpus": 2, "anything": [1, 2, 3]},
            "status": {"state": "Running"}
        }"#;
        let meta: ApiType = serde_json::from_str(json).unwrap();
        assert_eq!(meta.kind, "VM");
        assert_eq!(meta.uid().as_str(), "0123456789abcdef");
        assert_eq!(meta.name(), "web");
    }

    #[test]
    fn test_object_meta_rejects_unknown_fields() {
        let json = r#"{"name": "web", "labels": {}}"#;
        assert!(serde_json::from_str::<ObjectMeta>(json).is_err());
    }
}
