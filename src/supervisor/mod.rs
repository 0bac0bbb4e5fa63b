//! VM lifecycle supervision.
//!
//! One run takes a VM from its stored state to Running, blocks on the
//! hypervisor and always brings it back to Stopped:
//!
//! 1. load the VM and check it may start
//! 2. hand the container network over to the VM
//! 3. start DHCP and metrics, mark the VM Running with its addresses
//! 4. run the hypervisor until it exits
//! 5. mark the VM Stopped, remove its snapshot and metrics socket
//!
//! Teardown is registered on a [`CleanupStack`] as resources come up, so
//! it runs no matter where a later step fails.

pub mod cleanup;

pub use cleanup::CleanupStack;

use crate::apis::{ApiObject, Uid, Vm, VmState};
use crate::context::Context;
use crate::error::{Error, Result};
use crate::metrics::{self, VmMetrics};
use crate::network::Provisioner;
use crate::patch;
use crate::storage::Client;
use std::net::Ipv4Addr;
use std::path::PathBuf;

/// Runs one VM to completion.
pub struct Supervisor<'a> {
    ctx: &'a Context,
}

impl<'a> Supervisor<'a> {
    /// Create a supervisor over `ctx`.
    pub fn new(ctx: &'a Context) -> Self {
        Self { ctx }
    }

    /// Start the VM with `uid` and block until it has stopped.
    ///
    /// A hypervisor failure is returned only after teardown has run.
    pub fn run(&self, uid: &Uid) -> Result<()> {
        let vm = self.ctx.client.vms().get(uid)?;
        if !vm.status.state.can_transition_to(VmState::Running) {
            return Err(Error::InvalidState {
                expected: "Created or Stopped".into(),
                actual: vm.status.state.to_string(),
            });
        }
        tracing::info!(vm_id = %uid, name = %vm.name(), "starting VM");

        let ifaces = Provisioner::new(self.ctx.links.as_ref())
            .with_poll(self.ctx.config.poll_interval, self.ctx.config.poll_timeout)
            .setup()?;
        tracing::info!(vm_id = %uid, interfaces = ifaces.len(), "network ready");

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("ignite-metrics")
            .enable_all()
            .build()?;

        let ip_addresses = self.ctx.dhcp.start(&vm, &ifaces)?;

        let mut cleanup = CleanupStack::new();

        let socket = vm.metrics_socket(&self.ctx.config.data_dir);
        match VmMetrics::new(&vm).and_then(|m| metrics::serve(&runtime, &socket, m)) {
            Ok(socket) => cleanup.push("remove metrics socket", move || remove_socket(socket)),
            Err(e) => tracing::warn!(vm_id = %uid, error = %e, "metrics endpoint unavailable"),
        }

        let snapshot = self.ctx.snapshot.as_ref();
        let snapshot_vm = vm.clone();
        cleanup.push("deactivate snapshot", move || snapshot.deactivate(&snapshot_vm));

        let running = patch_running(&self.ctx.client, &vm, ip_addresses)?;
        let client = &self.ctx.client;
        let stopped_from = running.clone();
        cleanup.push("mark VM stopped", move || patch_stopped(client, &stopped_from));

        tracing::info!(vm_id = %uid, hypervisor = self.ctx.hypervisor.name(), "booting VM");
        let result = match self.ctx.hypervisor.run(&running, &ifaces) {
            Ok(reason) if reason.is_success() => {
                tracing::info!(vm_id = %uid, "VM exited");
                Ok(())
            }
            Ok(reason) => Err(Error::hypervisor(uid.as_str(), reason.to_string())),
            Err(e @ Error::Hypervisor { .. }) => Err(e),
            Err(e) => Err(Error::hypervisor(uid.as_str(), e.to_string())),
        };

        cleanup.run();
        runtime.shutdown_background();
        result
    }
}

/// Mark `vm` Running with `ip_addresses`, returning the view that was
/// written.
///
/// Nothing is read back after the patch lands, so once this returns `Ok`
/// the caller can always register the way back to Stopped.
fn patch_running(client: &Client, vm: &Vm, ip_addresses: Vec<Ipv4Addr>) -> Result<Vm> {
    let mut running = vm.clone();
    running.status.state = VmState::Running;
    running.status.ip_addresses = ip_addresses;

    let status = running.status.clone();
    let patch = patch::create(vm, |v: &mut Vm| {
        v.status = status;
        Ok(())
    })?;
    client.vms().patch(vm.uid(), &patch)?;

    tracing::info!(
        vm_id = %running.uid(),
        ips = ?running.status.ip_addresses,
        "VM marked running"
    );
    Ok(running)
}

/// Mark `vm` Stopped and clear its addresses.
fn patch_stopped(client: &Client, vm: &Vm) -> Result<()> {
    let patch = patch::create(vm, |v: &mut Vm| {
        v.status.state = VmState::Stopped;
        v.status.ip_addresses.clear();
        Ok(())
    })?;
    client.vms().patch(vm.uid(), &patch)?;
    tracing::info!(vm_id = %vm.uid(), "VM marked stopped");
    Ok(())
}

fn remove_socket(path: PathBuf) -> Result<()> {
    match std::fs::remove_file(&path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}
