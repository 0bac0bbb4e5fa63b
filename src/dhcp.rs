//! DHCP service for the guest.
//!
//! Each handed-over interface gets its own responder bound to the bridge,
//! offering exactly the address that was taken from the container.

use crate::apis::{ApiObject, Vm};
use crate::error::{Error, Result};
use crate::network::DhcpInterface;
use std::net::Ipv4Addr;
use std::os::unix::process::CommandExt;
use std::path::PathBuf;
use std::process::{Command, Stdio};

/// Serves guest addresses over DHCP in the background.
pub trait DhcpResponder: Send + Sync {
    /// Start serving every interface and return the addresses on offer.
    ///
    /// Started responders are never joined; they must not outlive the
    /// calling process.
    fn start(&self, vm: &Vm, ifaces: &[DhcpInterface]) -> Result<Vec<Ipv4Addr>>;
}

/// [`DhcpResponder`] running one `dnsmasq` per interface.
#[derive(Debug, Clone)]
pub struct Dnsmasq {
    bin: PathBuf,
}

impl Dnsmasq {
    /// Use the `dnsmasq` binary at `bin`.
    pub fn new(bin: impl Into<PathBuf>) -> Self {
        Self { bin: bin.into() }
    }

    fn args(iface: &DhcpInterface) -> Vec<String> {
        let ip = iface.vm_ip_net.addr;
        vec![
            "--keep-in-foreground".into(),
            "--port=0".into(),
            "--no-resolv".into(),
            "--no-hosts".into(),
            "--bind-dynamic".into(),
            format!("--interface={}", iface.bridge),
            format!(
                "--dhcp-range={},{},{},infinite",
                ip,
                ip,
                iface.vm_ip_net.netmask()
            ),
            format!("--dhcp-option=option:router,{}", iface.gateway),
            "--dhcp-leasefile=/dev/null".into(),
        ]
    }
}

impl DhcpResponder for Dnsmasq {
    fn start(&self, vm: &Vm, ifaces: &[DhcpInterface]) -> Result<Vec<Ipv4Addr>> {
        let mut served = Vec::with_capacity(ifaces.len());

        for iface in ifaces {
            let mut cmd = Command::new(&self.bin);
            cmd.args(Self::args(iface))
                .stdin(Stdio::null())
                .stdout(Stdio::null());

            // Tie the responder's lifetime to ours.
            unsafe {
                cmd.pre_exec(|| {
                    if libc::prctl(libc::PR_SET_PDEATHSIG, libc::SIGTERM) != 0 {
                        return Err(std::io::Error::last_os_error());
                    }
                    Ok(())
                });
            }

            let child = cmd.spawn().map_err(|e| {
                Error::command_failed(
                    format!("{} --interface={}", self.bin.display(), iface.bridge),
                    e.to_string(),
                )
            })?;

            tracing::info!(
                vm_id = %vm.uid(),
                bridge = %iface.bridge,
                ip = %iface.vm_ip_net.addr,
                gateway = %iface.gateway,
                pid = child.id(),
                "serving DHCP"
            );
            served.push(iface.vm_ip_net.addr);
        }

        Ok(served)
    }
}
