// SPDX-License-Identifier: GPL-3.0-only

//! Mountable descriptors
//!
//! A mountable names the thing a request operates on: a block device, a
//! path that is already mounted, or a btrfs subvolume inside a device. The
//! string form is what clients send; the tagged form is what handlers use.

use std::fmt;

use serde::Serialize;

use crate::{Result, TypesError};

/// Prefix marking a btrfs subvolume descriptor (`btrfsvol:/dev/sda3/root`)
pub const BTRFSVOL_PREFIX: &str = "btrfsvol:";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MountableKind {
    Device,
    Path,
    BtrfsSubvolume,
}

/// A resolved mountable.
///
/// `volume` is non-empty exactly when `kind` is [`MountableKind::BtrfsSubvolume`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Mountable {
    kind: MountableKind,
    device: String,
    volume: Option<String>,
}

impl Mountable {
    pub fn device(device: impl Into<String>) -> Self {
        Self {
            kind: MountableKind::Device,
            device: device.into(),
            volume: None,
        }
    }

    pub fn path(path: impl Into<String>) -> Self {
        Self {
            kind: MountableKind::Path,
            device: path.into(),
            volume: None,
        }
    }

    /// Build a subvolume mountable. The volume name must not be empty.
    pub fn btrfs_subvolume(device: impl Into<String>, volume: impl Into<String>) -> Result<Self> {
        let device = device.into();
        let volume = volume.into();
        if volume.is_empty() {
            return Err(TypesError::InvalidMountable(format!(
                "{BTRFSVOL_PREFIX}{device}/: empty subvolume name"
            )));
        }

        Ok(Self {
            kind: MountableKind::BtrfsSubvolume,
            device,
            volume: Some(volume),
        })
    }

    pub fn kind(&self) -> MountableKind {
        self.kind
    }

    /// The device or path; for subvolumes, the containing block device.
    pub fn device_path(&self) -> &str {
        &self.device
    }

    pub fn volume(&self) -> Option<&str> {
        self.volume.as_deref()
    }

    /// Render the descriptor string.
    ///
    /// Performs no I/O and cannot fail, so it is safe to use when building
    /// error messages.
    pub fn format(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Mountable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.kind, &self.volume) {
            (MountableKind::BtrfsSubvolume, Some(volume)) => {
                write!(f, "{BTRFSVOL_PREFIX}{}/{volume}", self.device)
            }
            _ => f.write_str(&self.device),
        }
    }
}
