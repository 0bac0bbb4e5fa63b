//! Device-mapper snapshot teardown.

use crate::apis::{ApiObject, Vm};
use crate::error::Result;
use crate::util::run_command;
use std::path::{Path, PathBuf};

/// Removes a VM's root filesystem snapshot.
pub trait SnapshotOps: Send + Sync {
    /// Remove the snapshot device and detach the loop devices backing it.
    fn deactivate(&self, vm: &Vm) -> Result<()>;
}

/// [`SnapshotOps`] using `dmsetup` and `losetup`.
#[derive(Debug, Clone)]
pub struct DeviceMapper {
    data_dir: PathBuf,
}

impl DeviceMapper {
    /// Create a device-mapper helper for VMs under `data_dir`.
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }
}

fn run(program: &str, args: &[&str]) -> Result<String> {
    let stdout = run_command(program, args)?;
    Ok(String::from_utf8_lossy(&stdout).into_owned())
}

/// Loop devices listed by `losetup -j`, one `"/dev/loopN: ..."` per line.
fn parse_loop_devices(output: &str) -> Vec<String> {
    output
        .lines()
        .filter_map(|line| line.split_once(':').map(|(dev, _)| dev.trim()))
        .filter(|dev| dev.starts_with("/dev/loop"))
        .map(str::to_string)
        .collect()
}

fn detach_loops(backing: &Path) -> Result<()> {
    let backing = backing.to_string_lossy();
    let listed = run("losetup", &["-j", &backing])?;
    for dev in parse_loop_devices(&listed) {
        run("losetup", &["-d", &dev])?;
        tracing::debug!(device = %dev, backing = %backing, "detached loop device");
    }
    Ok(())
}

impl SnapshotOps for DeviceMapper {
    fn deactivate(&self, vm: &Vm) -> Result<()> {
        let dev = vm.snapshot_dev();
        if dev.exists() {
            run("dmsetup", &["remove", &vm.snapshot_name()])?;
            tracing::debug!(vm_id = %vm.uid(), device = %dev.display(), "removed snapshot device");
        }

        let overlay = vm.overlay_file(&self.data_dir);
        if overlay.exists() {
            detach_loops(&overlay)?;
        }
        Ok(())
    }
}
