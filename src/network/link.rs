//! Kernel link and address operations.

use super::Ipv4Net;
use crate::error::Result;
use crate::util::run_command;
use serde::Deserialize;
use std::net::Ipv4Addr;

/// A network interface and its IPv4 addresses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interface {
    /// Interface name, e.g. `eth0`.
    pub name: String,
    /// IPv4 addresses in the order the kernel reports them.
    pub addrs: Vec<Ipv4Net>,
}

/// Operations on the links of the current network namespace.
pub trait LinkOps: Send + Sync {
    /// Enumerate interfaces with their IPv4 addresses.
    fn interfaces(&self) -> Result<Vec<Interface>>;

    /// Remove an address from an interface.
    fn del_addr(&self, iface: &str, addr: &Ipv4Net) -> Result<()>;

    /// Create a bridge device.
    fn create_bridge(&self, name: &str) -> Result<()>;

    /// Create a TAP device.
    fn create_tap(&self, name: &str) -> Result<()>;

    /// Attach `link` to the bridge `master`.
    fn set_master(&self, link: &str, master: &str) -> Result<()>;

    /// Bring a link up.
    fn set_up(&self, link: &str) -> Result<()>;
}

#[derive(Debug, Deserialize)]
struct IpLink {
    ifname: String,
    #[serde(default)]
    addr_info: Vec<IpAddrInfo>,
}

#[derive(Debug, Deserialize)]
struct IpAddrInfo {
    family: String,
    local: Option<String>,
    prefixlen: Option<u8>,
}

/// [`LinkOps`] driving the iproute2 `ip` tool.
#[derive(Debug, Clone)]
pub struct IpRoute2 {
    bin: String,
}

impl Default for IpRoute2 {
    fn default() -> Self {
        Self::new("ip")
    }
}

impl IpRoute2 {
    /// Use the `ip` binary at `bin`.
    pub fn new(bin: impl Into<String>) -> Self {
        Self { bin: bin.into() }
    }

    fn run(&self, args: &[&str]) -> Result<Vec<u8>> {
        run_command(&self.bin, args)
    }
}

/// Parse the output of `ip -j addr show`.
fn parse_addr_show(json: &[u8]) -> Result<Vec<Interface>> {
    let links: Vec<IpLink> = serde_json::from_slice(json)?;

    Ok(links
        .into_iter()
        .map(|link| {
            let addrs = link
                .addr_info
                .iter()
                .filter(|info| info.family == "inet")
                .filter_map(|info| {
                    let addr: Ipv4Addr = info.local.as_deref()?.parse().ok()?;
                    Some(Ipv4Net::new(addr, info.prefixlen.unwrap_or(32)))
                })
                .collect();
            Interface {
                name: link.ifname,
                addrs,
            }
        })
        .collect())
}

impl LinkOps for IpRoute2 {
    fn interfaces(&self) -> Result<Vec<Interface>> {
        let stdout = self.run(&["-j", "addr", "show"])?;
        parse_addr_show(&stdout)
    }

    fn del_addr(&self, iface: &str, addr: &Ipv4Net) -> Result<()> {
        self.run(&["addr", "del", &addr.to_string(), "dev", iface])?;
        Ok(())
    }

    fn create_bridge(&self, name: &str) -> Result<()> {
        self.run(&["link", "add", "name", name, "type", "bridge"])?;
        Ok(())
    }

    fn create_tap(&self, name: &str) -> Result<()> {
        self.run(&["tuntap", "add", "dev", name, "mode", "tap"])?;
        Ok(())
    }

    fn set_master(&self, link: &str, master: &str) -> Result<()> {
        self.run(&["link", "set", link, "master", master])?;
        Ok(())
    }

    fn set_up(&self, link: &str) -> Result<()> {
        self.run(&["link", "set", link, "up"])?;
        Ok(())
    }
}
