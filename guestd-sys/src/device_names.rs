// SPDX-License-Identifier: GPL-3.0-only

//! Device name translation
//!
//! The host library names drives `/dev/sdX[N]` in the order it attached
//! them. Inside the appliance the kernel may create `/dev/vda`, `/dev/sdb`
//! or anything else, and may enumerate them in a different order, so the
//! mapping is rebuilt at startup from the stable `/dev/disk/by-path`
//! directory and kept for the life of the daemon.
//!
//! Names that do not follow the `/dev/<xx>d<letters>[N]` scheme (`/dev/md0`,
//! `/dev/VG/LV`, `/dev/mapper/...`, `/dev/dm-N`) are passed through.

use std::ffi::OsStr;
use std::fs::{self, File};
use std::io;
use std::path::Path;

use guestd_types::{drive_index, drive_name};
use tracing::{debug, info, warn};

use crate::command::CommandRunner;
use crate::error::{Result, SysError};
use crate::strings::{filter_list, split_lines, trim};
use crate::utils::is_root_device;

/// Stable per-path device directory maintained by udev
pub const DEFAULT_BY_PATH_DIR: &str = "/dev/disk/by-path";

/// Driver prefixes tried, in order, when a `/dev/sd*` name does not exist
const FALLBACK_PREFIXES: [&str; 3] = ["/dev/vd", "/dev/hd", "/dev/ubd"];

/// Real device paths indexed by drive ordinal.
///
/// Built once before requests are served and never mutated afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceNameCache {
    devices: Vec<String>,
}

enum NodeState {
    Openable,
    Absent,
    Failed(io::Error),
}

impl DeviceNameCache {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Use an explicit drive list, index 0 first.
    pub fn from_devices(devices: Vec<String>) -> Self {
        Self { devices }
    }

    /// Populate the cache from `by_path_dir`.
    ///
    /// `ls -1v` gives the numeric ordering the host attached the drives in,
    /// which a plain lexical sort of the directory would not. Partition
    /// links are skipped, every remaining link is resolved to its device
    /// node, and the appliance's own root device is dropped.
    pub fn discover(
        runner: &CommandRunner,
        by_path_dir: &Path,
        root_device: Option<u64>,
    ) -> Result<Self> {
        let listing = runner.run("ls", &[OsStr::new("-1v"), by_path_dir.as_os_str()])?;
        let entries = filter_list(split_lines(&listing.stdout_lossy())?, |entry| {
            !trim(entry).is_empty() && !entry.contains("-part")
        });

        let mut devices = Vec::new();
        for entry in &entries {
            let link = by_path_dir.join(trim(entry));
            let device = fs::canonicalize(&link).map_err(|error| {
                SysError::Io(io::Error::new(
                    error.kind(),
                    format!("realpath: {}: {error}", link.display()),
                ))
            })?;
            let device = device.to_string_lossy().into_owned();

            if let Some(root) = root_device
                && is_root_device(&device, root)
            {
                debug!(device = %device, "skipping appliance root device");
                continue;
            }

            devices.push(device);
        }

        info!("Device name cache holds {} drive(s)", devices.len());
        Ok(Self { devices })
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn devices(&self) -> &[String] {
        &self.devices
    }

    /// Translate a client device name into an openable device node.
    ///
    /// Returns `Ok(None)` when no candidate exists (the "no such device"
    /// case) and `Err(DeviceOpen)` when a candidate exists but cannot be
    /// opened, so callers can report the two differently.
    pub fn translate(&self, name: &str) -> Result<Option<String>> {
        let candidate = self.lookup(name).unwrap_or_else(|| name.to_string());
        if candidate != name {
            debug!("device name translated: {name} -> {candidate}");
        }

        match node_state(&candidate) {
            NodeState::Openable => return Ok(Some(candidate)),
            NodeState::Failed(source) => {
                warn!(device = %candidate, "cannot open device: {source}");
                return Err(SysError::DeviceOpen {
                    device: candidate,
                    source,
                });
            }
            NodeState::Absent => {}
        }

        let Some(rest) = name.strip_prefix("/dev/sd") else {
            return Ok(None);
        };

        let mut last_failure = None;
        for prefix in FALLBACK_PREFIXES {
            let alternative = format!("{prefix}{rest}");
            match node_state(&alternative) {
                NodeState::Openable => {
                    debug!("device name translated: {name} -> {alternative}");
                    return Ok(Some(alternative));
                }
                NodeState::Failed(source) => last_failure = Some((alternative, source)),
                NodeState::Absent => {}
            }
        }

        match last_failure {
            Some((device, source)) => Err(SysError::DeviceOpen { device, source }),
            None => Ok(None),
        }
    }

    /// Translate `name`, insisting that it is a `/dev/` name that exists.
    pub fn resolve_device(&self, name: &str) -> Result<String> {
        if !name.starts_with("/dev/") {
            return Err(SysError::malformed(name, "expecting a device name"));
        }

        self.translate(name)?
            .ok_or_else(|| SysError::DeviceNotFound(name.to_string()))
    }

    /// Map a real device path back to its canonical `/dev/sdX[N]` name.
    ///
    /// Paths that are not a cached drive or one of its numbered partitions
    /// come back unchanged. Performs no I/O.
    pub fn reverse_translate(&self, device: &str) -> String {
        for (index, cached) in self.devices.iter().enumerate() {
            let Some(suffix) = device.strip_prefix(cached.as_str()) else {
                continue;
            };

            if suffix.is_empty() || suffix.starts_with(|c: char| c.is_ascii_digit()) {
                let canonical = format!("/dev/sd{}{suffix}", drive_name(index));
                debug!("reverse device name translated: {device} -> {canonical}");
                return canonical;
            }
        }

        device.to_string()
    }

    /// Canonical names of every cached drive, in attachment order.
    pub fn canonical_devices(&self) -> Vec<String> {
        (0..self.devices.len())
            .map(|index| format!("/dev/sd{}", drive_name(index)))
            .collect()
    }

    /// Drive ordinal of a real whole-disk device path.
    pub fn index_of(&self, device: &str) -> Option<usize> {
        self.devices.iter().position(|cached| cached == device)
    }

    fn lookup(&self, name: &str) -> Option<String> {
        let (letters, suffix) = split_canonical(name)?;
        let Some(index) = drive_index(letters) else {
            warn!("unparsable device name: {name}");
            return None;
        };

        self.devices
            .get(index)
            .map(|device| format!("{device}{suffix}"))
    }
}

/// Split `/dev/sdb2` into `("b", "2")`.
///
/// The driver prefix is one or two characters ending in `d` (`sd`, `vd`,
/// `hd`, `xvd`'s `xv` + `d`). RAID (`/dev/md*`) and LVM paths are excluded.
fn split_canonical(name: &str) -> Option<(&str, &str)> {
    let rest = name.strip_prefix("/dev/")?;
    if rest.contains('/') || rest.starts_with('m') {
        return None;
    }

    let driver_len = rest.find('d')?;
    if driver_len == 0 || driver_len > 2 {
        return None;
    }

    let start = &rest[driver_len + 1..];
    let letters_len = start
        .bytes()
        .take_while(|byte| byte.is_ascii_lowercase())
        .count();

    Some(start.split_at(letters_len))
}

/// Open the device read-only to see whether it is really there.
///
/// Device nodes can exist in the appliance without a backing device, which
/// shows up as ENXIO rather than ENOENT.
fn node_state(device: &str) -> NodeState {
    match File::open(device) {
        Ok(_) => NodeState::Openable,
        Err(error)
            if error.kind() == io::ErrorKind::NotFound
                || error.raw_os_error() == Some(libc::ENXIO) =>
        {
            NodeState::Absent
        }
        Err(error) => NodeState::Failed(error),
    }
}
