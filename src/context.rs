//! Everything one supervisor run needs, built once at startup.

use crate::config::SpawnConfig;
use crate::dhcp::{DhcpResponder, Dnsmasq};
use crate::network::{IpRoute2, LinkOps};
use crate::scheme::Serializer;
use crate::storage::{Client, FilesystemRawStorage, GenericStorage};
use crate::vm::{DeviceMapper, Firecracker, Hypervisor, SnapshotOps};
use std::sync::Arc;

/// Collaborators of the supervisor.
pub struct Context {
    /// Loaded configuration.
    pub config: SpawnConfig,
    /// Typed object store.
    pub client: Client,
    /// Network namespace operations.
    pub links: Box<dyn LinkOps>,
    /// VM runner.
    pub hypervisor: Box<dyn Hypervisor>,
    /// Guest DHCP service.
    pub dhcp: Box<dyn DhcpResponder>,
    /// Root filesystem snapshot teardown.
    pub snapshot: Box<dyn SnapshotOps>,
}

impl Context {
    /// Wire the production collaborators from `config`.
    pub fn new(config: SpawnConfig) -> Self {
        let storage = GenericStorage::new(
            FilesystemRawStorage::new(&config.data_dir),
            Serializer::default(),
        );

        Self {
            client: Client::new(Arc::new(storage)),
            links: Box::new(IpRoute2::new(config.ip_bin.clone())),
            hypervisor: Box::new(Firecracker::new(
                config.firecracker_bin.clone(),
                config.data_dir.clone(),
            )),
            dhcp: Box::new(Dnsmasq::new(config.dnsmasq_bin.clone())),
            snapshot: Box::new(DeviceMapper::new(config.data_dir.clone())),
            config,
        }
    }
}
