//! Image and Kernel kinds, and the OCI references they carry.

use super::meta::ObjectMeta;
use serde::{Deserialize, Serialize};

/// Where an OCI artifact is pulled from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImageSourceType {
    /// Docker daemon / registry.
    #[default]
    Docker,
}

impl ImageSourceType {
    /// All supported source types.
    pub fn all() -> &'static [ImageSourceType] {
        &[ImageSourceType::Docker]
    }
}

/// Desired OCI artifact, as requested by the user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OciImageClaim {
    /// Source type.
    #[serde(rename = "type", default)]
    pub source_type: ImageSourceType,

    /// Image reference, e.g. `weaveworks/ignite-ubuntu:latest`.
    #[serde(rename = "ref", default)]
    pub reference: String,
}

/// Resolved OCI artifact, as observed after import.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct OciImageSource {
    /// Content ID of the image.
    #[serde(default)]
    pub id: String,

    /// Size in bytes.
    #[serde(default)]
    pub size: u64,

    /// Registry digests the image is known by.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub repo_digests: Vec<String>,
}

/// A root filesystem image imported from OCI.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Image {
    /// Kind name.
    #[serde(default)]
    pub kind: String,
    /// `group/version`.
    #[serde(default)]
    pub api_version: String,
    /// Identity metadata.
    #[serde(default)]
    pub metadata: ObjectMeta,
    /// Desired configuration.
    #[serde(default)]
    pub spec: ImageSpec,
    /// Observed state.
    #[serde(default)]
    pub status: ImageStatus,
}

/// Desired configuration of an [`Image`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ImageSpec {
    /// OCI artifact to import.
    #[serde(default)]
    pub oci_claim: OciImageClaim,
}

/// Observed state of an [`Image`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ImageStatus {
    /// Resolved artifact.
    #[serde(default)]
    pub oci_source: OciImageSource,
}

/// A guest kernel imported from OCI.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Kernel {
    /// Kind name.
    #[serde(default)]
    pub kind: String,
    /// `group/version`.
    #[serde(default)]
    pub api_version: String,
    /// Identity metadata.
    #[serde(default)]
    pub metadata: ObjectMeta,
    /// Desired configuration.
    #[serde(default)]
    pub spec: KernelSpec,
    /// Observed state.
    #[serde(default)]
    pub status: KernelStatus,
}

/// Desired configuration of a [`Kernel`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct KernelSpec {
    /// OCI artifact to import.
    #[serde(default)]
    pub oci_claim: OciImageClaim,
}

/// Observed state of a [`Kernel`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct KernelStatus {
    /// Kernel release string, e.g. `4.19.47`.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub version: String,
    /// Resolved artifact.
    #[serde(default)]
    pub oci_source: OciImageSource,
}
