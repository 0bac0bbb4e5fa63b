//! Well-known names, paths and defaults.

/// Root of all per-object runtime data.
pub const DATA_DIR: &str = "/var/lib/firecracker";

/// Prefix of device-mapper devices owned by ignite.
pub const IGNITE_PREFIX: &str = "ignite-";

/// Prefix of TAP devices handed to the VM.
pub const TAP_PREFIX: &str = "vm_";

/// Prefix of bridges joining a TAP device and a container interface.
pub const BRIDGE_PREFIX: &str = "br_";

/// Metrics socket file name inside the VM's object directory.
pub const PROMETHEUS_SOCKET: &str = "prometheus.sock";

/// Overlay file backing the snapshot device.
pub const OVERLAY_FILE: &str = "overlay.dm";

/// Guest kernel image inside the VM's object directory.
pub const KERNEL_FILE: &str = "vmlinux";

/// Hypervisor config file written into the VM's object directory.
pub const FIRECRACKER_CONFIG_FILE: &str = "firecracker.json";

/// Kind names.
pub const VM_KIND: &str = "VM";
/// Kind name of root filesystem images.
pub const IMAGE_KIND: &str = "Image";
/// Kind name of kernels.
pub const KERNEL_KIND: &str = "Kernel";

/// Default vCPU count.
pub const VM_DEFAULT_CPUS: u64 = 1;

/// Default memory in MiB.
pub const VM_DEFAULT_MEMORY_MIB: u64 = 512;

/// Default overlay size in MiB.
pub const VM_DEFAULT_DISK_SIZE_MIB: u64 = 4096;

/// Default kernel command line.
pub const VM_DEFAULT_KERNEL_ARGS: &str = "console=ttyS0 reboot=k panic=1 pci=off ip=dhcp";

/// Interfaces never forwarded to the VM.
pub const IGNORED_INTERFACES: &[&str] = &["lo"];
