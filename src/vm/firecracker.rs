//! Firecracker hypervisor.
//!
//! The VM is described by a JSON config file written into its object
//! directory, and Firecracker is started with the API socket disabled so
//! the process lives exactly as long as the guest.

use super::{ExitReason, Hypervisor};
use crate::apis::{ApiObject, Vm};
use crate::constants::{FIRECRACKER_CONFIG_FILE, KERNEL_FILE};
use crate::error::{Error, Result};
use crate::network::DhcpInterface;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::Command;

#[derive(Debug, Serialize, PartialEq)]
struct BootSource {
    kernel_image_path: PathBuf,
    boot_args: String,
}

#[derive(Debug, Serialize, PartialEq)]
struct Drive {
    drive_id: String,
    path_on_host: PathBuf,
    is_root_device: bool,
    is_read_only: bool,
}

#[derive(Debug, Serialize, PartialEq)]
struct MachineConfig {
    vcpu_count: u64,
    mem_size_mib: u64,
}

#[derive(Debug, Serialize, PartialEq)]
struct NetworkInterface {
    iface_id: String,
    host_dev_name: String,
}

/// Firecracker's `--config-file` document.
#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
struct FirecrackerConfig {
    boot_source: BootSource,
    drives: Vec<Drive>,
    machine_config: MachineConfig,
    network_interfaces: Vec<NetworkInterface>,
}

impl FirecrackerConfig {
    fn for_vm(vm: &Vm, object_path: &Path, ifaces: &[DhcpInterface]) -> Self {
        Self {
            boot_source: BootSource {
                kernel_image_path: object_path.join(KERNEL_FILE),
                boot_args: vm.spec.kernel.cmd_line.clone(),
            },
            drives: vec![Drive {
                drive_id: "rootfs".into(),
                path_on_host: vm.snapshot_dev(),
                is_root_device: true,
                is_read_only: false,
            }],
            machine_config: MachineConfig {
                vcpu_count: vm.spec.cpus,
                mem_size_mib: vm.spec.memory,
            },
            network_interfaces: ifaces
                .iter()
                .map(|iface| NetworkInterface {
                    iface_id: iface.iface.clone(),
                    host_dev_name: iface.tap.clone(),
                })
                .collect(),
        }
    }
}

/// Runs VMs with the `firecracker` binary.
#[derive(Debug, Clone)]
pub struct Firecracker {
    bin: PathBuf,
    data_dir: PathBuf,
}

impl Firecracker {
    /// Create a hypervisor using `bin`, with VM directories under
    /// `data_dir`.
    pub fn new(bin: impl Into<PathBuf>, data_dir: impl Into<PathBuf>) -> Self {
        Self {
            bin: bin.into(),
            data_dir: data_dir.into(),
        }
    }

    /// Write the config file for `vm` and return its path.
    fn write_config(&self, vm: &Vm, ifaces: &[DhcpInterface]) -> Result<PathBuf> {
        let object_path = vm.object_path(&self.data_dir);
        std::fs::create_dir_all(&object_path)?;

        let config = FirecrackerConfig::for_vm(vm, &object_path, ifaces);
        let json =
            serde_json::to_vec_pretty(&config).map_err(|e| Error::Encode(e.to_string()))?;

        let path = object_path.join(FIRECRACKER_CONFIG_FILE);
        std::fs::write(&path, json)?;
        Ok(path)
    }
}

impl Hypervisor for Firecracker {
    fn name(&self) -> &'static str {
        "firecracker"
    }

    fn run(&self, vm: &Vm, ifaces: &[DhcpInterface]) -> Result<ExitReason> {
        let config = self.write_config(vm, ifaces)?;

        tracing::info!(
            vm_id = %vm.uid(),
            config = %config.display(),
            cpus = vm.spec.cpus,
            memory_mib = vm.spec.memory,
            "starting firecracker"
        );

        let status = Command::new(&self.bin)
            .arg("--no-api")
            .arg("--config-file")
            .arg(&config)
            .status()
            .map_err(|e| {
                Error::hypervisor(
                    vm.uid().as_str(),
                    format!("failed to start {}: {}", self.bin.display(), e),
                )
            })?;

        let reason = ExitReason::from(status);
        tracing::info!(vm_id = %vm.uid(), reason = %reason, "firecracker exited");
        Ok(reason)
    }
}
