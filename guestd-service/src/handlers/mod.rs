// SPDX-License-Identifier: GPL-3.0-only

//! Request handlers
//!
//! Each handler is a plain blocking function over the shared
//! [`DaemonContext`]. The dispatcher runs them on the blocking pool.

mod command;
mod devices;
mod headtail;
mod mountable;

use guestd_sys::DaemonContext;
use guestd_types::{Call, ReplyValue};

use crate::error::{Result, ServiceError};

/// Run one call to completion.
pub fn handle(ctx: &DaemonContext, call: Call) -> Result<ReplyValue> {
    match call {
        Call::Ping => Ok(ReplyValue::Unit),
        Call::Command { argv } => command::command(ctx, &argv).map(ReplyValue::String),
        Call::CommandLines { argv } => {
            command::command_lines(ctx, &argv).map(ReplyValue::Strings)
        }
        Call::Sh { command } => command::sh(ctx, &command).map(ReplyValue::String),
        Call::ShLines { command } => command::sh_lines(ctx, &command).map(ReplyValue::Strings),
        Call::Head { path } => headtail::head(ctx, &path).map(ReplyValue::Strings),
        Call::HeadN { lines, path } => {
            headtail::head_n(ctx, lines, &path).map(ReplyValue::Strings)
        }
        Call::Tail { path } => headtail::tail(ctx, &path).map(ReplyValue::Strings),
        Call::TailN { lines, path } => {
            headtail::tail_n(ctx, lines, &path).map(ReplyValue::Strings)
        }
        Call::ListDevices => Ok(ReplyValue::Strings(devices::list_devices(ctx))),
        Call::CanonicalDeviceName { device } => {
            devices::canonical_device_name(ctx, &device).map(ReplyValue::String)
        }
        Call::DeviceIndex { device } => devices::device_index(ctx, &device).map(ReplyValue::Int),
        Call::MountableDevice { mountable } => {
            mountable::mountable_device(ctx, &mountable).map(ReplyValue::String)
        }
        Call::MountableSubvolume { mountable } => {
            mountable::mountable_subvolume(ctx, &mountable).map(ReplyValue::String)
        }
        Call::UdevSettle => {
            ctx.udev_settle();
            Ok(ReplyValue::Unit)
        }
    }
}

/// Fail unless a guest root filesystem is mounted on the sysroot.
fn need_root(ctx: &DaemonContext, procedure: &'static str) -> Result<()> {
    if ctx.sysroot().is_mounted() {
        Ok(())
    } else {
        Err(ServiceError::NeedRoot(procedure))
    }
}

#[cfg(test)]
mod tests {
    use guestd_sys::DeviceNameCache;

    use super::*;

    #[test]
    fn ping_and_list_devices() {
        let ctx = DaemonContext::builder()
            .devices(DeviceNameCache::from_devices(vec![
                "/dev/vda".into(),
                "/dev/vdb".into(),
            ]))
            .build()
            .unwrap();

        assert_eq!(handle(&ctx, Call::Ping).unwrap(), ReplyValue::Unit);
        assert_eq!(
            handle(&ctx, Call::ListDevices).unwrap(),
            ReplyValue::Strings(vec!["/dev/sda".into(), "/dev/sdb".into()])
        );
    }

    #[test]
    fn unmounted_sysroot_needs_root() {
        let ctx = DaemonContext::builder()
            .sysroot("/nonexistent/guestd-sysroot")
            .build()
            .unwrap();

        let err = handle(
            &ctx,
            Call::Sh {
                command: "true".into(),
            },
        )
        .unwrap_err();
        assert!(matches!(err, ServiceError::NeedRoot("sh")));
    }
}
