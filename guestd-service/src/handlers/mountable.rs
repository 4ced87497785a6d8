// SPDX-License-Identifier: GPL-3.0-only

use guestd_sys::{DaemonContext, parse_mountable};
use guestd_types::MountableKind;

use crate::error::{Result, ServiceError};

/// The device part of a mountable, in canonical form.
pub fn mountable_device(ctx: &DaemonContext, descriptor: &str) -> Result<String> {
    let mountable = parse_mountable(ctx, descriptor)?;
    Ok(ctx.devices().reverse_translate(mountable.device_path()))
}

/// The subvolume part of a btrfs subvolume mountable.
pub fn mountable_subvolume(ctx: &DaemonContext, descriptor: &str) -> Result<String> {
    let mountable = parse_mountable(ctx, descriptor)?;

    match (mountable.kind(), mountable.volume()) {
        (MountableKind::BtrfsSubvolume, Some(volume)) => Ok(volume.to_string()),
        _ => Err(ServiceError::InvalidArgument(format!(
            "{descriptor}: mountable is not a btrfs subvolume"
        ))),
    }
}
