// SPDX-License-Identifier: GPL-3.0-only

//! Low-level appliance operations for the guestd daemon
//!
//! This crate is the core every request handler is built on:
//!
//! - **command**: runs external tools with concurrent stdout/stderr capture
//!   and optional forwarding of a guest file to the tool's stdin
//! - **sysroot**: confines guest paths to the mounted guest filesystem
//! - **device_names**: maps canonical `/dev/sdX` names to the appliance's
//!   real device nodes and back
//! - **mountable**: parses device, path and btrfs subvolume descriptors
//! - **strings**: string-list building and line splitting
//!
//! Process-wide state lives in a [`DaemonContext`] built once at startup.

pub mod command;
pub mod context;
pub mod device_names;
pub mod error;
pub mod mountable;
pub mod strings;
pub mod sysroot;
pub mod utils;

#[cfg(test)]
pub(crate) mod testutil;

pub use command::{CommandFlag, CommandOptions, CommandOutput, CommandRunner, shell_quote};
pub use context::{DaemonContext, DaemonContextBuilder};
pub use device_names::{DEFAULT_BY_PATH_DIR, DeviceNameCache};
pub use error::{Result, SysError};
pub use mountable::{parse_mountable, parse_mountable_or_path, split_btrfsvol};
pub use strings::{StringList, split_lines};
pub use sysroot::{DEFAULT_SYSROOT, Sysroot, SysrootGuard};
pub use utils::{prog_exists, root_device_of, udev_settle};
