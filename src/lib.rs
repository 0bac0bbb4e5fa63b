//! ignite - supervisor for a single Firecracker micro-VM.
//!
//! `ignite-spawn` runs inside the VM's container. It moves the container's
//! network over to the VM, records the VM as running in the object store,
//! runs the hypervisor in the foreground and tears everything down again
//! when it exits.

pub mod apis;
pub mod config;
pub mod constants;
pub mod context;
pub mod dhcp;
pub mod error;
pub mod metrics;
pub mod network;
pub mod patch;
pub mod scheme;
pub mod storage;
pub mod supervisor;
pub mod util;
pub mod vm;

pub use error::{Error, Result};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
