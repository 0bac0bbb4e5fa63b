//! Hypervisor execution and VM disk teardown.
//!
//! - [`Hypervisor`]: runs one VM to completion
//! - [`SnapshotOps`]: removes the VM's root filesystem snapshot afterwards

pub mod exit;
pub mod firecracker;
pub mod snapshot;

use crate::apis::Vm;
use crate::error::Result;
use crate::network::DhcpInterface;
pub use exit::ExitReason;
pub use firecracker::Firecracker;
pub use snapshot::{DeviceMapper, SnapshotOps};

/// Runs a VM in the foreground.
pub trait Hypervisor: Send + Sync {
    /// Hypervisor name, e.g. `firecracker`.
    fn name(&self) -> &'static str;

    /// Boot `vm` attached to the TAP devices of `ifaces` and block until
    /// it exits.
    ///
    /// Returns how the hypervisor process ended; an error means it could
    /// not be run at all.
    fn run(&self, vm: &Vm, ifaces: &[DhcpInterface]) -> Result<ExitReason>;
}
