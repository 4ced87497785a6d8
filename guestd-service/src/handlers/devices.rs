// SPDX-License-Identifier: GPL-3.0-only

use guestd_sys::{DaemonContext, split_btrfsvol};
use guestd_types::{BTRFSVOL_PREFIX, Mountable};

use crate::error::{Result, ServiceError};

/// Canonical names of every drive the host attached, in attachment order.
pub fn list_devices(ctx: &DaemonContext) -> Vec<String> {
    ctx.devices().canonical_devices()
}

/// Rewrite a real device name (or btrfs subvolume descriptor) in the
/// canonical `/dev/sdX` form the host uses.
pub fn canonical_device_name(ctx: &DaemonContext, device: &str) -> Result<String> {
    let Some(rest) = device.strip_prefix(BTRFSVOL_PREFIX) else {
        return Ok(ctx.devices().reverse_translate(device));
    };

    let parsed = split_btrfsvol(ctx.devices(), ctx.root_device(), rest)?;
    let canonical = Mountable::btrfs_subvolume(
        ctx.devices().reverse_translate(parsed.device_path()),
        parsed.volume().unwrap_or_default(),
    )?;
    Ok(canonical.format())
}

/// Attachment index of a whole-disk device.
pub fn device_index(ctx: &DaemonContext, device: &str) -> Result<i64> {
    let real = ctx.resolve_device(device)?;

    ctx.devices()
        .index_of(&real)
        .and_then(|index| i64::try_from(index).ok())
        .ok_or_else(|| ServiceError::InvalidArgument(format!("{device}: device not found")))
}
