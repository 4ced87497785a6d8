// SPDX-License-Identifier: GPL-3.0-only

//! Sandboxed access to the mounted guest filesystem
//!
//! The guest's root filesystem is mounted under the sysroot directory. Client
//! paths are always absolute paths inside the guest and must never reach
//! anything outside it. Two mechanisms are offered:
//!
//! - [`Sysroot::join`] prefixes a guest path with the sysroot, for handing to
//!   external tools
//! - [`Sysroot::enter`] chroots the daemon into the sysroot until the
//!   returned guard is dropped, for direct filesystem calls that must see
//!   the guest's own root (symlinks resolve inside the guest)
//!
//! Entering the sysroot saves handles to the current root and working
//! directory; leaving restores both, whatever the working directory was.

use std::ffi::OsString;
use std::fs::{self, File, Metadata, OpenOptions};
use std::io;
use std::os::fd::AsRawFd;
use std::os::unix::ffi::OsStringExt;
use std::os::unix::fs::{MetadataExt, OpenOptionsExt};
use std::path::{Path, PathBuf};

use tracing::error;

use crate::error::{Result, SysError};

/// Default mount point of the guest root inside the appliance
pub const DEFAULT_SYSROOT: &str = "/sysroot";

#[derive(Debug, Clone)]
pub struct Sysroot {
    root: PathBuf,
}

impl Sysroot {
    /// `root` is stored as given; a trailing slash would double up in
    /// [`Sysroot::join`], so it is removed.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let mut bytes = root.into_os_string().into_vec();
        while bytes.len() > 1 && bytes.ends_with(b"/") {
            bytes.pop();
        }

        Self {
            root: PathBuf::from(OsString::from_vec(bytes)),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Turn guest path `"/path"` into `"<sysroot>/path"`.
    ///
    /// The result is a plain concatenation: `..` components are not
    /// resolved, and existence is not checked.
    pub fn join(&self, path: &str) -> Result<PathBuf> {
        require_absolute(path)?;

        let mut joined = self.root.clone().into_os_string();
        joined.push(path);
        Ok(PathBuf::from(joined))
    }

    /// Chroot into the sysroot until the guard is dropped.
    ///
    /// Not reentrant: the daemon handles one request at a time and only
    /// that request may hold the guard.
    pub fn enter(&self) -> Result<SysrootGuard> {
        let saved_root = open_dir(Path::new("/"))?;
        let saved_cwd = open_dir(Path::new("."))?;

        nix::unistd::chroot(&self.root).map_err(|errno| {
            SysError::Io(io::Error::new(
                io::Error::from(errno).kind(),
                format!("chroot {}: {errno}", self.root.display()),
            ))
        })?;

        // From here on the guard undoes the chroot on every exit.
        let guard = SysrootGuard {
            saved_root,
            saved_cwd,
        };
        nix::unistd::chdir("/").map_err(|errno| {
            SysError::Io(io::Error::new(
                io::Error::from(errno).kind(),
                format!("chdir / in {}: {errno}", self.root.display()),
            ))
        })?;

        Ok(guard)
    }

    /// Open a guest file for reading.
    pub fn open(&self, path: &str) -> Result<File> {
        require_absolute(path)?;
        let _guard = self.enter()?;
        Ok(File::open(path)?)
    }

    /// Stat a guest path, following symlinks inside the guest.
    pub fn metadata(&self, path: &str) -> Result<Metadata> {
        require_absolute(path)?;
        let _guard = self.enter()?;
        Ok(fs::metadata(path)?)
    }

    pub fn create_dir(&self, path: &str) -> Result<()> {
        require_absolute(path)?;
        let _guard = self.enter()?;
        Ok(fs::create_dir(path)?)
    }

    /// Resolve `path` inside the guest and return it with the sysroot
    /// prefix, ready for an external tool.
    pub fn realpath(&self, path: &str) -> Result<PathBuf> {
        require_absolute(path)?;
        let resolved = {
            let _guard = self.enter()?;
            fs::canonicalize(path)?
        };

        let mut joined = self.root.clone().into_os_string();
        joined.push(resolved.into_os_string());
        Ok(PathBuf::from(joined))
    }

    /// True if a filesystem is mounted on the sysroot.
    pub fn is_mounted(&self) -> bool {
        let (Ok(root), Ok(parent)) = (
            fs::metadata(&self.root),
            fs::metadata(self.root.join("..")),
        ) else {
            return false;
        };

        root.dev() != parent.dev() || root.ino() == parent.ino()
    }
}

impl Default for Sysroot {
    fn default() -> Self {
        Self::new(DEFAULT_SYSROOT)
    }
}

/// Leaves the chroot when dropped, on every path out of the caller.
///
/// Holds directory handles taken before entering: the old root, to chroot
/// back to, and the old working directory, to return to afterwards.
#[must_use = "the chroot is left as soon as the guard is dropped"]
#[derive(Debug)]
pub struct SysrootGuard {
    saved_root: File,
    saved_cwd: File,
}

impl SysrootGuard {
    fn leave(&self) -> io::Result<()> {
        fchdir(&self.saved_root)?;
        nix::unistd::chroot(".").map_err(io::Error::from)?;
        fchdir(&self.saved_cwd)
    }
}

impl Drop for SysrootGuard {
    fn drop(&mut self) {
        if let Err(error) = self.leave() {
            error!("leaving sysroot: {error}");
        }
    }
}

/// Open a directory handle usable only for `fchdir`.
fn open_dir(path: &Path) -> Result<File> {
    OpenOptions::new()
        .read(true)
        .custom_flags(libc::O_PATH | libc::O_DIRECTORY)
        .open(path)
        .map_err(|error| {
            SysError::Io(io::Error::new(
                error.kind(),
                format!("open {}: {error}", path.display()),
            ))
        })
}

fn fchdir(dir: &File) -> io::Result<()> {
    // SAFETY: the descriptor stays open for the duration of the call.
    if unsafe { libc::fchdir(dir.as_raw_fd()) } < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

fn require_absolute(path: &str) -> Result<()> {
    if path.starts_with('/') {
        Ok(())
    } else {
        Err(SysError::SandboxViolation {
            path: path.to_string(),
            reason: "path must start with a / character".to_string(),
        })
    }
}
