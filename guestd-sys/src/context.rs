// SPDX-License-Identifier: GPL-3.0-only

use std::path::{Path, PathBuf};

use tracing::info;

use crate::command::CommandRunner;
use crate::device_names::{DEFAULT_BY_PATH_DIR, DeviceNameCache};
use crate::error::{Result, SysError};
use crate::sysroot::Sysroot;
use crate::utils;

/// Process-wide daemon state.
///
/// Built once at startup, before the first request is read, and shared
/// read-only with every handler afterwards.
#[derive(Debug, Clone)]
pub struct DaemonContext {
    sysroot: Sysroot,
    devices: DeviceNameCache,
    runner: CommandRunner,
    root_device: Option<u64>,
}

impl DaemonContext {
    pub fn builder() -> DaemonContextBuilder {
        DaemonContextBuilder::default()
    }

    pub fn sysroot(&self) -> &Sysroot {
        &self.sysroot
    }

    pub fn devices(&self) -> &DeviceNameCache {
        &self.devices
    }

    pub fn runner(&self) -> &CommandRunner {
        &self.runner
    }

    pub fn verbose(&self) -> bool {
        self.runner.verbose()
    }

    /// `st_dev` of the appliance root, when known
    pub fn root_device(&self) -> Option<u64> {
        self.root_device
    }

    /// Validate and translate a client device argument.
    pub fn resolve_device(&self, name: &str) -> Result<String> {
        if !self.is_device_parameter(name) {
            return Err(SysError::malformed(name, "expecting a device name"));
        }
        self.devices.resolve_device(name)
    }

    pub fn is_root_device(&self, path: &str) -> bool {
        self.root_device
            .is_some_and(|root| utils::is_root_device(path, root))
    }

    pub fn is_device_parameter(&self, path: &str) -> bool {
        utils::is_device_parameter(path, self.root_device, self.verbose())
    }

    pub fn udev_settle(&self) {
        utils::udev_settle(&self.runner, None);
    }
}

#[derive(Debug, Default)]
pub struct DaemonContextBuilder {
    sysroot: Option<PathBuf>,
    by_path_dir: Option<PathBuf>,
    devices: Option<DeviceNameCache>,
    verbose: bool,
    discover: bool,
    root_device: Option<u64>,
}

impl DaemonContextBuilder {
    pub fn sysroot(mut self, sysroot: impl Into<PathBuf>) -> Self {
        self.sysroot = Some(sysroot.into());
        self
    }

    pub fn by_path_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.by_path_dir = Some(dir.into());
        self
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Populate the device-name cache and record the appliance root device
    /// when building.
    pub fn discover_devices(mut self, discover: bool) -> Self {
        self.discover = discover;
        self
    }

    /// Use a fixed drive list instead of discovering one.
    pub fn devices(mut self, devices: DeviceNameCache) -> Self {
        self.devices = Some(devices);
        self
    }

    pub fn root_device(mut self, root_device: u64) -> Self {
        self.root_device = Some(root_device);
        self
    }

    pub fn build(self) -> Result<DaemonContext> {
        let runner = CommandRunner::new(self.verbose);
        let sysroot = self.sysroot.map(Sysroot::new).unwrap_or_default();

        let mut root_device = self.root_device;
        let devices = match self.devices {
            Some(devices) => devices,
            None if self.discover => {
                let root = match root_device {
                    Some(root) => root,
                    None => utils::root_device_of(Path::new("/"))?,
                };
                root_device = Some(root);

                let by_path_dir = self
                    .by_path_dir
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_BY_PATH_DIR));
                DeviceNameCache::discover(&runner, &by_path_dir, Some(root))?
            }
            None => DeviceNameCache::empty(),
        };

        info!(
            sysroot = %sysroot.root().display(),
            drives = devices.len(),
            "Daemon context ready"
        );

        Ok(DaemonContext {
            sysroot,
            devices,
            runner,
            root_device,
        })
    }
}
