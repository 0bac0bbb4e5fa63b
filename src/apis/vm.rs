//! The VM kind.

use super::image::{Image, Kernel, OciImageClaim, OciImageSource};
use super::meta::ObjectMeta;
use crate::constants;
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};

/// A micro-VM.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Vm {
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
    pub spec: VmSpec,
    /// Observed state, owned by the supervisor while it runs.
    #[serde(default)]
    pub status: VmStatus,
}

/// Desired configuration of a [`Vm`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct VmSpec {
    /// Root filesystem image.
    #[serde(default)]
    pub image: VmImageSpec,
    /// Guest kernel.
    #[serde(default)]
    pub kernel: VmKernelSpec,
    /// Number of vCPUs.
    #[serde(default)]
    pub cpus: u64,
    /// Memory in MiB.
    #[serde(default)]
    pub memory: u64,
    /// Size of the writable overlay in MiB.
    #[serde(default)]
    pub disk_size: u64,
    /// Network configuration.
    #[serde(default)]
    pub network: VmNetworkSpec,
}

/// Image reference of a VM.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct VmImageSpec {
    /// OCI artifact of the rootfs.
    #[serde(default)]
    pub oci_claim: OciImageClaim,
}

/// Kernel reference and command line of a VM.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct VmKernelSpec {
    /// OCI artifact of the kernel.
    #[serde(default)]
    pub oci_claim: OciImageClaim,
    /// Kernel command line.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub cmd_line: String,
}

/// Network configuration of a VM.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct VmNetworkSpec {
    /// Ports forwarded from the host to the VM.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<PortMapping>,
}

/// A host-to-VM port forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PortMapping {
    /// Port on the host.
    pub host_port: u16,
    /// Port inside the VM.
    pub vm_port: u16,
}

/// Observed state of a [`Vm`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct VmStatus {
    /// Lifecycle state.
    #[serde(default)]
    pub state: VmState,

    /// Addresses served to the VM. Only non-empty while running.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ip_addresses: Vec<Ipv4Addr>,

    /// Resolved rootfs image.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<OciImageSource>,

    /// Resolved kernel.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kernel: Option<OciImageSource>,
}

/// VM lifecycle state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VmState {
    /// Created, never started.
    #[default]
    Created,
    /// Hypervisor running.
    Running,
    /// Hypervisor exited. May be started again.
    Stopped,
}

impl VmState {
    /// All VM states.
    pub fn all() -> &'static [VmState] {
        &[VmState::Created, VmState::Running, VmState::Stopped]
    }

    /// Check whether moving from `self` to `next` is a valid transition.
    pub fn can_transition_to(self, next: VmState) -> bool {
        matches!(
            (self, next),
            (VmState::Created, VmState::Running)
                | (VmState::Stopped, VmState::Running)
                | (VmState::Running, VmState::Stopped)
        )
    }

    /// Get the state name as a string.
    pub fn name(&self) -> &'static str {
        match self {
            VmState::Created => "Created",
            VmState::Running => "Running",
            VmState::Stopped => "Stopped",
        }
    }
}

impl std::fmt::Display for VmState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl Vm {
    /// Returns true if the VM is running.
    pub fn running(&self) -> bool {
        self.status.state == VmState::Running
    }

    /// Populate the image fields from an imported [`Image`].
    pub fn set_image(&mut self, image: &Image) {
        self.spec.image.oci_claim = image.spec.oci_claim.clone();
        self.status.image = Some(image.status.oci_source.clone());
    }

    /// Populate the kernel fields from an imported [`Kernel`].
    pub fn set_kernel(&mut self, kernel: &Kernel) {
        self.spec.kernel.oci_claim = kernel.spec.oci_claim.clone();
        self.status.kernel = Some(kernel.status.oci_source.clone());
    }

    /// Directory holding this VM's runtime data.
    pub fn object_path(&self, data_dir: &Path) -> PathBuf {
        data_dir
            .join(constants::VM_KIND.to_lowercase())
            .join(self.metadata.uid.as_str())
    }

    /// Path of the device-mapper overlay file.
    pub fn overlay_file(&self, data_dir: &Path) -> PathBuf {
        self.object_path(data_dir).join(constants::OVERLAY_FILE)
    }

    /// Path of the metrics socket.
    pub fn metrics_socket(&self, data_dir: &Path) -> PathBuf {
        self.object_path(data_dir).join(constants::PROMETHEUS_SOCKET)
    }

    /// Device-mapper snapshot device of the root filesystem.
    pub fn snapshot_dev(&self) -> PathBuf {
        PathBuf::from("/dev/mapper").join(self.snapshot_name())
    }

    /// Device-mapper name of the snapshot.
    pub fn snapshot_name(&self) -> String {
        format!("{}{}", constants::IGNITE_PREFIX, self.metadata.uid)
    }

    /// Fill unset spec fields with defaults.
    pub fn set_defaults(&mut self) {
        if self.spec.cpus == 0 {
            self.spec.cpus = constants::VM_DEFAULT_CPUS;
        }
        if self.spec.memory == 0 {
            self.spec.memory = constants::VM_DEFAULT_MEMORY_MIB;
        }
        if self.spec.disk_size == 0 {
            self.spec.disk_size = constants::VM_DEFAULT_DISK_SIZE_MIB;
        }
        if self.spec.kernel.cmd_line.is_empty() {
            self.spec.kernel.cmd_line = constants::VM_DEFAULT_KERNEL_ARGS.to_string();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apis::meta::Uid;

    fn vm(uid: &str) -> Vm {
        let mut vm = Vm::default();
        vm.metadata.uid = Uid::new(uid);
        vm
    }

    #[test]
    fn test_state_transitions() {
        use VmState::*;
        // (from, to, valid)
        let cases = [
            (Created, Running, true),
            (Running, Stopped, true),
            (Stopped, Running, true),
            (Created, Stopped, false),
            (Running, Running, false),
            (Stopped, Created, false),
            (Running, Created, false),
        ];
        for (from, to, valid) in cases {
            assert_eq!(from.can_transition_to(to), valid, "{} -> {}", from, to);
        }
    }

    #[test]
    fn test_state_serializes_capitalized() {
        assert_eq!(serde_json::to_string(&VmState::Running).unwrap(), "\"Running\"");
        assert_eq!(VmState::all().len(), 3);
    }

    #[test]
    fn test_paths_derive_from_uid() {
        let vm = vm("0123456789abcdef");
        let data = Path::new("/var/lib/firecracker");
        assert_eq!(
            vm.object_path(data),
            PathBuf::from("/var/lib/firecracker/vm/0123456789abcdef")
        );
        assert_eq!(
            vm.metrics_socket(data),
            PathBuf::from("/var/lib/firecracker/vm/0123456789abcdef/prometheus.sock")
        );
        assert_eq!(
            vm.overlay_file(data),
            PathBuf::from("/var/lib/firecracker/vm/0123456789abcdef/overlay.dm")
        );
        assert_eq!(
            vm.snapshot_dev(),
            PathBuf::from("/dev/mapper/ignite-0123456789abcdef")
        );
    }

    #[test]
    fn test_defaults_only_fill_zero_fields() {
        let mut vm = vm("a");
        vm.spec.cpus = 4;
        vm.set_defaults();
        assert_eq!(vm.spec.cpus, 4);
        assert_eq!(vm.spec.memory, constants::VM_DEFAULT_MEMORY_MIB);
        assert_eq!(vm.spec.disk_size, constants::VM_DEFAULT_DISK_SIZE_MIB);
        assert_eq!(vm.spec.kernel.cmd_line, constants::VM_DEFAULT_KERNEL_ARGS);
    }

    #[test]
    fn test_set_image_and_kernel() {
        let mut image = Image::default();
        image.spec.oci_claim.reference = "weaveworks/ignite-ubuntu:latest".into();
        image.status.oci_source.id = "sha256:aaa".into();
        let mut kernel = Kernel::default();
        kernel.spec.oci_claim.reference = "weaveworks/ignite-kernel:4.19.47".into();

        let mut vm = vm("a");
        vm.set_image(&image);
        vm.set_kernel(&kernel);
        assert_eq!(vm.spec.image.oci_claim.reference, "weaveworks/ignite-ubuntu:latest");
        assert_eq!(vm.status.image.as_ref().unwrap().id, "sha256:aaa");
        assert_eq!(vm.spec.kernel.oci_claim.reference, "weaveworks/ignite-kernel:4.19.47");
        assert!(vm.status.kernel.is_some());
    }

    #[test]
    fn test_empty_ip_list_is_omitted() {
        let status = VmStatus::default();
        let json = serde_json::to_value(&status).unwrap();
        assert!(json.get("ipAddresses").is_none());
    }
}
