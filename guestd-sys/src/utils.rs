// SPDX-License-Identifier: GPL-3.0-only

//! Appliance helpers: root-device detection, device parameter checks and
//! udev synchronization.

use std::ffi::OsString;
use std::fs::{self, File, Metadata};
use std::io;
use std::os::fd::AsRawFd;
use std::os::unix::fs::{FileTypeExt, MetadataExt};
use std::path::Path;

use tracing::{debug, warn};

use crate::command::CommandRunner;
use crate::error::{Result, SysError};

// linux/fs.h: BLKGETSIZE64 = _IOR(0x12, 114, size_t)
nix::ioctl_read!(blk_get_size64, 0x12, 114, u64);

/// Device number of the filesystem holding `root`.
///
/// Used to recognise the appliance's own root disk so it is never offered
/// to clients.
pub fn root_device_of(root: &Path) -> Result<u64> {
    let metadata = fs::metadata(root).map_err(|error| {
        SysError::Io(io::Error::new(
            error.kind(),
            format!("stat {}: {error}", root.display()),
        ))
    })?;
    Ok(metadata.dev())
}

pub fn is_root_device_metadata(metadata: &Metadata, root_device: u64) -> bool {
    metadata.rdev() == root_device
}

/// True if the device node at `path` is the appliance root disk.
///
/// Stat failures are logged and treated as "not the root device".
pub fn is_root_device(path: &str, root_device: u64) -> bool {
    match fs::metadata(path) {
        Ok(metadata) => is_root_device_metadata(&metadata, root_device),
        Err(error) => {
            warn!("is_root_device: {path}: {error}");
            false
        }
    }
}

/// Check that `path` is acceptable as a device argument.
///
/// Only names under `/dev/` qualify. Canonical `/dev/sd*` names are
/// accepted without looking at them, since they are translated later.
/// Directories are accepted (LVM volume groups appear as `/dev/VG`), except
/// `/dev/` itself. Anything else must be a block device other than the root
/// disk whose size can be queried.
pub fn is_device_parameter(path: &str, root_device: Option<u64>, verbose: bool) -> bool {
    if !path.starts_with("/dev/") {
        return false;
    }

    if path.starts_with("/dev/sd") {
        return true;
    }

    let metadata = match fs::metadata(path) {
        Ok(metadata) => metadata,
        Err(error) => {
            if verbose {
                debug!("is_device_parameter: {path}: {error}");
            }
            return false;
        }
    };

    if metadata.is_dir() {
        return path.len() > 5;
    }

    if !metadata.file_type().is_block_device() {
        return false;
    }

    if let Some(root) = root_device
        && is_root_device_metadata(&metadata, root)
    {
        return false;
    }

    match block_device_size(path) {
        Ok(_) => true,
        Err(error) => {
            if verbose {
                debug!("is_device_parameter: {path}: BLKGETSIZE64: {error}");
            }
            false
        }
    }
}

/// Size in bytes of the block device at `path`.
pub fn block_device_size(path: &str) -> io::Result<u64> {
    let file = File::open(path)?;
    let mut size: u64 = 0;
    // SAFETY: the fd is open for the duration of the call and `size` is a
    // valid u64 the kernel writes into.
    unsafe { blk_get_size64(file.as_raw_fd(), &mut size) }.map_err(io::Error::from)?;
    Ok(size)
}

/// Wait for udev to finish processing queued events.
///
/// Called after anything that creates or removes device nodes. With
/// `exists`, udevadm also returns as soon as that file appears. Failures are
/// logged and otherwise ignored: the next operation reports its own error if
/// the device is still missing.
pub fn udev_settle(runner: &CommandRunner, exists: Option<&str>) {
    let mut argv: Vec<OsString> = vec!["udevadm".into()];
    if runner.verbose() {
        argv.push("--debug".into());
    }
    argv.push("settle".into());
    if let Some(file) = exists {
        argv.push("-E".into());
        argv.push(file.into());
    }

    match runner.run_argv_allow_nonzero(&argv) {
        Ok(output) if output.success() => {}
        Ok(output) => warn!(
            "udevadm settle: exited with status {}: {}",
            output.code, output.stderr
        ),
        Err(error) => warn!("udevadm settle: {error}"),
    }
}

/// True if `program` is on `PATH`.
pub fn prog_exists(program: &str) -> bool {
    which::which(program).is_ok()
}
