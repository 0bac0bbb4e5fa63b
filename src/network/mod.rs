//! Container network provisioning.
//!
//! Inside the container, each interface (except loopback) is handed over
//! to the VM: its IPv4 address is removed from the container side and the
//! interface is bridged with a new TAP device that the hypervisor
//! attaches to. The removed address is later served to the guest over
//! DHCP.
//!
//! Interfaces can show up late or without an address yet, so setup runs
//! as a bounded poll.

pub mod link;

pub use link::{Interface, IpRoute2, LinkOps};

use crate::constants::{BRIDGE_PREFIX, IGNORED_INTERFACES, TAP_PREFIX};
use crate::error::{Error, Result};
use crate::util::wait::{poll_immediate, Attempt};
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use std::time::Duration;

/// Default pause between provisioning attempts.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Default time to keep retrying before giving up.
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(60);

/// An IPv4 address with its prefix length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ipv4Net {
    /// Host address.
    pub addr: Ipv4Addr,
    /// Prefix length, 0 to 32.
    pub prefix_len: u8,
}

impl Ipv4Net {
    /// Create an address/prefix pair. Prefixes over 32 are clamped.
    pub fn new(addr: Ipv4Addr, prefix_len: u8) -> Self {
        Self {
            addr,
            prefix_len: prefix_len.min(32),
        }
    }

    /// Dotted netmask for the prefix.
    pub fn netmask(&self) -> Ipv4Addr {
        let bits = u32::MAX
            .checked_shl(32 - u32::from(self.prefix_len))
            .unwrap_or(0);
        Ipv4Addr::from(bits)
    }

    /// Gateway convention: the `.1` address of the first three octets.
    pub fn gateway(&self) -> Ipv4Addr {
        let [a, b, c, _] = self.addr.octets();
        Ipv4Addr::new(a, b, c, 1)
    }
}

impl std::fmt::Display for Ipv4Net {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.addr, self.prefix_len)
    }
}

/// A container interface that was handed over to the VM.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DhcpInterface {
    /// Container interface the address was taken from.
    pub iface: String,
    /// Bridge joining the interface and the TAP.
    pub bridge: String,
    /// TAP device the hypervisor attaches to.
    pub tap: String,
    /// Router handed to the guest.
    pub gateway: Ipv4Addr,
    /// Address and prefix the guest receives.
    pub vm_ip_net: Ipv4Net,
}

/// Moves container interfaces over to the VM.
pub struct Provisioner<'a> {
    links: &'a dyn LinkOps,
    interval: Duration,
    timeout: Duration,
}

impl<'a> Provisioner<'a> {
    /// Create a provisioner with the default poll policy.
    pub fn new(links: &'a dyn LinkOps) -> Self {
        Self {
            links,
            interval: DEFAULT_POLL_INTERVAL,
            timeout: DEFAULT_POLL_TIMEOUT,
        }
    }

    /// Override the poll policy.
    pub fn with_poll(mut self, interval: Duration, timeout: Duration) -> Self {
        self.interval = interval;
        self.timeout = timeout;
        self
    }

    /// Provision networking, retrying until at least one interface has
    /// been handed over.
    ///
    /// Fails with [`Error::FatalNetwork`] if interfaces cannot be
    /// enumerated or if nothing was handed over before the timeout.
    pub fn setup(&self) -> Result<Vec<DhcpInterface>> {
        let result = poll_immediate("container network interfaces", self.interval, self.timeout, || {
            self.attempt()
        });

        match result {
            Ok(ifaces) => Ok(ifaces),
            Err(Error::Timeout { what, seconds }) => Err(Error::FatalNetwork(format!(
                "no usable interfaces after {}s: {}",
                seconds, what
            ))),
            Err(e) => Err(e),
        }
    }

    fn attempt(&self) -> Attempt<Vec<DhcpInterface>> {
        let ifaces = match self.links.interfaces() {
            Ok(ifaces) => ifaces,
            Err(e) => {
                return Attempt::Fatal(Error::FatalNetwork(format!(
                    "cannot get local network interfaces: {}",
                    e
                )))
            }
        };

        let mut handed_over = Vec::new();
        for iface in ifaces
            .iter()
            .filter(|i| !IGNORED_INTERFACES.contains(&i.name.as_str()))
        {
            let vm_ip_net = match self.take_address(iface) {
                Ok(net) => net,
                Err(e) => {
                    tracing::info!(iface = %iface.name, error = %e, "interface not ready");
                    continue;
                }
            };

            match self.bridge(&iface.name) {
                Ok((bridge, tap)) => {
                    handed_over.push(DhcpInterface {
                        iface: iface.name.clone(),
                        bridge,
                        tap,
                        gateway: vm_ip_net.gateway(),
                        vm_ip_net,
                    });
                }
                Err(e) => {
                    tracing::error!(iface = %iface.name, error = %e, "bridging interface failed");
                }
            }
        }

        if handed_over.is_empty() {
            return Attempt::Retry(Error::RetryableNetwork(
                "no active or valid interfaces available yet".into(),
            )
            .to_string());
        }
        Attempt::Done(handed_over)
    }

    /// Remove the first IPv4 address of `iface` and return it.
    fn take_address(&self, iface: &Interface) -> Result<Ipv4Net> {
        let net = iface.addrs.first().copied().ok_or_else(|| {
            Error::RetryableNetwork(format!("interface {} has no address", iface.name))
        })?;

        self.links.del_addr(&iface.name, &net)?;
        tracing::info!(
            iface = %iface.name,
            ip = %net.addr,
            netmask = %net.netmask(),
            "moving IP address from container to VM"
        );
        Ok(net)
    }

    /// Create the TAP and bridge for `iface` and attach both to it.
    fn bridge(&self, iface: &str) -> Result<(String, String)> {
        let tap = format!("{}{}", TAP_PREFIX, iface);
        let bridge = format!("{}{}", BRIDGE_PREFIX, iface);

        self.links.create_tap(&tap)?;
        self.links.set_up(&tap)?;
        self.links.create_bridge(&bridge)?;
        self.links.set_up(&bridge)?;
        self.links.set_master(&tap, &bridge)?;
        self.links.set_master(iface, &bridge)?;

        tracing::debug!(iface = %iface, bridge = %bridge, tap = %tap, "bridged interface");
        Ok((bridge, tap))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use parking_lot::Mutex;

    /// In-memory namespace recording what was done to it.
    #[derive(Default)]
    pub(crate) struct FakeLinks {
        pub ifaces: Mutex<Vec<Interface>>,
        pub ops: Mutex<Vec<String>>,
        pub fail_enumeration: bool,
        pub fail_bridge_for: Option<String>,
        /// Enumerations that report every interface without addresses,
        /// as if DHCP in the container had not finished yet.
        pub unconfigured_for: usize,
        pub enumerations: Mutex<usize>,
    }

    impl FakeLinks {
        pub fn with(ifaces: Vec<Interface>) -> Self {
            Self {
                ifaces: Mutex::new(ifaces),
                ..Default::default()
            }
        }

        fn record(&self, op: String) {
            self.ops.lock().push(op);
        }
    }

    impl LinkOps for FakeLinks {
        fn interfaces(&self) -> Result<Vec<Interface>> {
            if self.fail_enumeration {
                return Err(Error::command_failed("ip -j addr show", "netlink down"));
            }
            let mut count = self.enumerations.lock();
            *count += 1;

            let mut ifaces = self.ifaces.lock().clone();
            if *count <= self.unconfigured_for {
                for iface in &mut ifaces {
                    iface.addrs.clear();
                }
            }
            Ok(ifaces)
        }

        fn del_addr(&self, iface: &str, addr: &Ipv4Net) -> Result<()> {
            let mut ifaces = self.ifaces.lock();
            let found = ifaces
                .iter_mut()
                .find(|i| i.name == iface)
                .ok_or_else(|| Error::command_failed("ip addr del", "no such device"))?;
            found.addrs.retain(|a| a != addr);
            drop(ifaces);
            self.record(format!("del {} {}", iface, addr));
            Ok(())
        }

        fn create_bridge(&self, name: &str) -> Result<()> {
            if self.fail_bridge_for.as_deref() == name.strip_prefix(BRIDGE_PREFIX) {
                return Err(Error::command_failed("ip link add", "operation not supported"));
            }
            self.record(format!("bridge {}", name));
            Ok(())
        }

        fn create_tap(&self, name: &str) -> Result<()> {
            self.record(format!("tap {}", name));
            Ok(())
        }

        fn set_master(&self, link: &str, master: &str) -> Result<()> {
            self.record(format!("master {} {}", link, master));
            Ok(())
        }

        fn set_up(&self, link: &str) -> Result<()> {
            self.record(format!("up {}", link));
            Ok(())
        }
    }

    pub(crate) fn iface(name: &str, addrs: &[(Ipv4Addr, u8)]) -> Interface {
        Interface {
            name: name.to_string(),
            addrs: addrs.iter().map(|(a, p)| Ipv4Net::new(*a, *p)).collect(),
        }
    }

    fn fast(links: &FakeLinks) -> Provisioner<'_> {
        Provisioner::new(links).with_poll(Duration::from_millis(5), Duration::from_millis(50))
    }

    #[test]
    fn test_netmask_and_gateway() {
        let net = Ipv4Net::new(Ipv4Addr::new(10, 0, 0, 5), 24);
        assert_eq!(net.netmask(), Ipv4Addr::new(255, 255, 255, 0));
        assert_eq!(net.gateway(), Ipv4Addr::new(10, 0, 0, 1));
        assert_eq!(net.to_string(), "10.0.0.5/24");
        assert_eq!(Ipv4Net::new(Ipv4Addr::UNSPECIFIED, 0).netmask(), Ipv4Addr::UNSPECIFIED);
        assert_eq!(Ipv4Net::new(Ipv4Addr::LOCALHOST, 40).prefix_len, 32);
    }

    #[test]
    fn test_hands_over_eth0_and_skips_lo() {
        let links = FakeLinks::with(vec![
            iface("lo", &[(Ipv4Addr::LOCALHOST, 8)]),
            iface("eth0", &[(Ipv4Addr::new(10, 0, 0, 5), 24)]),
        ]);

        let ifaces = fast(&links).setup().unwrap();
        assert_eq!(ifaces.len(), 1);
        let eth0 = &ifaces[0];
        assert_eq!(eth0.iface, "eth0");
        assert_eq!(eth0.bridge, "br_eth0");
        assert_eq!(eth0.tap, "vm_eth0");
        assert_eq!(eth0.gateway, Ipv4Addr::new(10, 0, 0, 1));
        assert_eq!(eth0.vm_ip_net, Ipv4Net::new(Ipv4Addr::new(10, 0, 0, 5), 24));

        let state = links.ifaces.lock();
        assert!(state[1].addrs.is_empty(), "eth0 should lose its address");
        assert_eq!(state[0].addrs.len(), 1, "lo is left alone");

        let ops = links.ops.lock();
        assert!(ops.contains(&"master vm_eth0 br_eth0".to_string()));
        assert!(ops.contains(&"master eth0 br_eth0".to_string()));
    }

    #[test]
    fn test_only_first_address_is_taken() {
        let links = FakeLinks::with(vec![iface(
            "eth0",
            &[(Ipv4Addr::new(10, 0, 0, 5), 24), (Ipv4Addr::new(10, 0, 1, 5), 24)],
        )]);
        let ifaces = fast(&links).setup().unwrap();
        assert_eq!(ifaces[0].vm_ip_net.addr, Ipv4Addr::new(10, 0, 0, 5));
        assert_eq!(links.ifaces.lock()[0].addrs.len(), 1);
    }

    #[test]
    fn test_no_addresses_times_out_fatally() {
        let links = FakeLinks::with(vec![
            iface("lo", &[(Ipv4Addr::LOCALHOST, 8)]),
            iface("eth0", &[]),
        ]);
        let err = fast(&links).setup().unwrap_err();
        assert!(matches!(err, Error::FatalNetwork(_)), "{:?}", err);
        assert!(err.to_string().starts_with("network setup failed"));
    }

    #[test]
    fn test_retries_until_address_appears() {
        let mut links = FakeLinks::with(vec![
            iface("lo", &[(Ipv4Addr::LOCALHOST, 8)]),
            iface("eth0", &[(Ipv4Addr::new(10, 0, 0, 5), 24)]),
        ]);
        links.unconfigured_for = 2;

        let ifaces = fast(&links).setup().unwrap();
        assert_eq!(ifaces.len(), 1);
        assert_eq!(ifaces[0].iface, "eth0");
        assert_eq!(ifaces[0].vm_ip_net.addr, Ipv4Addr::new(10, 0, 0, 5));
        assert_eq!(*links.enumerations.lock(), 3);

        // Nothing was touched while eth0 had no address.
        let ops = links.ops.lock();
        assert_eq!(ops.iter().filter(|op| op.starts_with("tap ")).count(), 1);
    }

    #[test]
    fn test_enumeration_failure_is_fatal_without_retry() {
        let links = FakeLinks {
            fail_enumeration: true,
            ..Default::default()
        };
        let provisioner =
            Provisioner::new(&links).with_poll(Duration::from_secs(10), Duration::from_secs(60));
        let start = std::time::Instant::now();
        let err = provisioner.setup().unwrap_err();
        assert!(matches!(err, Error::FatalNetwork(_)));
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_bridge_failure_skips_only_that_interface() {
        let mut links = FakeLinks::with(vec![
            iface("eth0", &[(Ipv4Addr::new(10, 0, 0, 5), 24)]),
            iface("eth1", &[(Ipv4Addr::new(192, 168, 1, 20), 24)]),
        ]);
        links.fail_bridge_for = Some("eth0".into());

        let ifaces = fast(&links).setup().unwrap();
        assert_eq!(ifaces.len(), 1);
        assert_eq!(ifaces[0].iface, "eth1");
        assert_eq!(ifaces[0].gateway, Ipv4Addr::new(192, 168, 1, 1));
    }
}
