// SPDX-License-Identifier: GPL-3.0-only

//! Running guest programs inside the sysroot

use std::ffi::OsStr;
use std::path::PathBuf;

use guestd_sys::{CommandRunner, DaemonContext, Sysroot, split_lines};
use tracing::{debug, warn};

use super::need_root;
use crate::error::{Result, ServiceError};

/// Host paths bind-mounted into the guest while a guest command runs
const BIND_SOURCES: [&str; 4] = ["/dev", "/dev/pts", "/proc", "/sys"];

/// Appliance filesystems bind-mounted into the sysroot.
///
/// Guest tools expect a populated `/dev`, `/proc` and `/sys`. A mount that
/// fails is tolerated (the command may not need it) and is not unmounted
/// later. Everything that did mount is unmounted in reverse order on drop.
struct BindMounts<'a> {
    runner: &'a CommandRunner,
    mounted: Vec<PathBuf>,
}

impl<'a> BindMounts<'a> {
    fn mount(runner: &'a CommandRunner, sysroot: &Sysroot) -> Result<Self> {
        let mut mounted = Vec::with_capacity(BIND_SOURCES.len());
        for (source, target) in bind_targets(sysroot)? {
            let args = [OsStr::new("--bind"), OsStr::new(source), target.as_os_str()];
            match runner.run("mount", &args) {
                Ok(_) => mounted.push(target),
                Err(error) if error.is_fatal() => return Err(error.into()),
                Err(error) => debug!("bind mount {source}: {error}"),
            }
        }

        Ok(Self { runner, mounted })
    }
}

impl Drop for BindMounts<'_> {
    fn drop(&mut self) {
        for target in self.mounted.drain(..).rev() {
            if let Err(error) = self.runner.run("umount", &[target.as_os_str()]) {
                warn!("umount {}: {error}", target.display());
            }
        }
    }
}

fn bind_targets(sysroot: &Sysroot) -> Result<Vec<(&'static str, PathBuf)>> {
    BIND_SOURCES
        .iter()
        .map(|source| Ok((*source, sysroot.join(source)?)))
        .collect()
}

fn run_in_guest(ctx: &DaemonContext, procedure: &'static str, argv: &[String]) -> Result<String> {
    need_root(ctx, procedure)?;

    if argv.is_empty() {
        return Err(ServiceError::InvalidArgument(
            "passed an empty list".to_string(),
        ));
    }

    let _binds = BindMounts::mount(ctx.runner(), ctx.sysroot())?;
    let output = {
        let _chroot = ctx.sysroot().enter()?;
        ctx.runner().run_argv(argv)?
    };

    Ok(output.into_stdout_string())
}

pub fn command(ctx: &DaemonContext, argv: &[String]) -> Result<String> {
    run_in_guest(ctx, "command", argv)
}

pub fn command_lines(ctx: &DaemonContext, argv: &[String]) -> Result<Vec<String>> {
    let out = run_in_guest(ctx, "command_lines", argv)?;
    Ok(split_lines(&out)?)
}

fn shell_argv(command: &str) -> [String; 3] {
    ["/bin/sh".to_string(), "-c".to_string(), command.to_string()]
}

pub fn sh(ctx: &DaemonContext, command: &str) -> Result<String> {
    run_in_guest(ctx, "sh", &shell_argv(command))
}

pub fn sh_lines(ctx: &DaemonContext, command: &str) -> Result<Vec<String>> {
    let out = run_in_guest(ctx, "sh_lines", &shell_argv(command))?;
    Ok(split_lines(&out)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_targets_live_under_sysroot() {
        let targets = bind_targets(&Sysroot::new("/sysroot")).unwrap();
        let targets: Vec<_> = targets
            .iter()
            .map(|(source, target)| (*source, target.to_string_lossy().into_owned()))
            .collect();

        assert_eq!(
            targets,
            vec![
                ("/dev", "/sysroot/dev".to_string()),
                ("/dev/pts", "/sysroot/dev/pts".to_string()),
                ("/proc", "/sysroot/proc".to_string()),
                ("/sys", "/sysroot/sys".to_string()),
            ]
        );
    }

    #[test]
    fn empty_argv_is_rejected_before_mounting() {
        let ctx = DaemonContext::builder().sysroot("/").build().unwrap();
        let err = command(&ctx, &[]).unwrap_err();
        assert!(matches!(err, ServiceError::InvalidArgument(_)));
    }

    #[test]
    fn shell_commands_go_through_bin_sh() {
        assert_eq!(shell_argv("ls /"), ["/bin/sh", "-c", "ls /"]);
    }
}
