// SPDX-License-Identifier: GPL-3.0-only

//! Shared domain models for the guestd appliance daemon
//!
//! These types cross the boundary between the daemon and the host-side
//! library:
//!
//! - **guestd-sys**: parses and resolves [`Mountable`] descriptors against
//!   the appliance's device nodes
//! - **guestd-service**: decodes [`Request`]s and encodes [`Reply`]s on the
//!   transport channel
//!
//! Nothing in this crate performs I/O.

pub mod drive;
pub mod error;
pub mod mountable;
pub mod protocol;

pub use drive::{drive_index, drive_name};
pub use error::{Result, TypesError};
pub use mountable::{BTRFSVOL_PREFIX, Mountable, MountableKind};
pub use protocol::{Call, Reply, ReplyValue, Request};
