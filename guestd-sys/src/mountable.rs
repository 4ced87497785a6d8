// SPDX-License-Identifier: GPL-3.0-only

//! Mountable descriptor parsing
//!
//! Clients send `/dev/...` device names, `btrfsvol:<device>/<volume>`
//! subvolume descriptors, and for some calls plain guest paths. Parsing
//! resolves the device part to a real node, so the resulting
//! [`Mountable`] can be handed straight to a tool.

use std::fs;
use std::os::unix::fs::MetadataExt;

use guestd_types::{BTRFSVOL_PREFIX, Mountable};
use tracing::debug;

use crate::context::DaemonContext;
use crate::device_names::DeviceNameCache;
use crate::error::{Result, SysError};

/// Parse a device or btrfs subvolume descriptor.
pub fn parse_mountable(ctx: &DaemonContext, descriptor: &str) -> Result<Mountable> {
    if let Some(rest) = descriptor.strip_prefix(BTRFSVOL_PREFIX) {
        return split_btrfsvol(ctx.devices(), ctx.root_device(), rest);
    }

    Ok(Mountable::device(ctx.resolve_device(descriptor)?))
}

/// Like [`parse_mountable`], but an absolute path that is not a device
/// names something already mounted under the sysroot.
pub fn parse_mountable_or_path(ctx: &DaemonContext, descriptor: &str) -> Result<Mountable> {
    if descriptor.starts_with("/dev/") || descriptor.starts_with(BTRFSVOL_PREFIX) {
        return parse_mountable(ctx, descriptor);
    }

    if !descriptor.starts_with('/') {
        return Err(SysError::SandboxViolation {
            path: descriptor.to_string(),
            reason: "path must start with a / character".to_string(),
        });
    }

    if !ctx.sysroot().is_mounted() {
        return Err(SysError::SandboxViolation {
            path: descriptor.to_string(),
            reason: "no root filesystem is mounted".to_string(),
        });
    }

    Ok(Mountable::path(descriptor))
}

/// Split `/dev/<device>/<volume>` into a subvolume mountable.
///
/// The device part may itself contain slashes (`/dev/VG/LV`), so each
/// slash after `/dev/` is tried in turn. A prefix that does not translate
/// is skipped. The first prefix naming something other than a directory
/// or the appliance root disk is the device.
pub fn split_btrfsvol(
    devices: &DeviceNameCache,
    root_device: Option<u64>,
    descriptor: &str,
) -> Result<Mountable> {
    let full = || format!("{BTRFSVOL_PREFIX}{descriptor}");

    if !descriptor.starts_with("/dev/") {
        return Err(SysError::malformed(full(), "device must start with /dev/"));
    }

    let search_from = "/dev/".len();
    for (offset, _) in descriptor[search_from..].match_indices('/') {
        let split = search_from + offset;
        let prefix = &descriptor[..split];

        let device = match devices.translate(prefix) {
            Ok(Some(device)) => device,
            Ok(None) => {
                debug!("btrfsvol: {prefix}: no such device, trying a longer prefix");
                continue;
            }
            Err(error) => {
                debug!("btrfsvol: {prefix}: {error}, trying a longer prefix");
                continue;
            }
        };

        let metadata = fs::metadata(&device)
            .map_err(|error| SysError::malformed(full(), format!("stat {device}: {error}")))?;

        let is_root = root_device.is_some_and(|root| metadata.rdev() == root);
        if metadata.is_dir() || is_root {
            continue;
        }

        let volume = &descriptor[split + 1..];
        return Mountable::btrfs_subvolume(device, volume)
            .map_err(|error| SysError::malformed(full(), error.to_string()));
    }

    Err(SysError::malformed(full(), "could not parse btrfs volume"))
}
