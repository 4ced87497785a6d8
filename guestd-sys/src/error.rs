// SPDX-License-Identifier: GPL-3.0-only

use thiserror::Error;

/// Error types for appliance-level operations
#[derive(Error, Debug)]
pub enum SysError {
    /// Allocation or descriptor-table exhaustion.
    ///
    /// When raised while creating pipes or spawning a child the daemon
    /// cannot safely continue; see [`SysError::is_fatal`].
    #[error("resource exhausted: {context}: {source}")]
    ResourceExhausted {
        context: String,
        #[source]
        source: std::io::Error,
        fatal: bool,
    },

    #[error("{program}: {reason}")]
    LaunchFailure { program: String, reason: String },

    #[error("{command}: exited with status {code}: {stderr}")]
    NonZeroExit {
        command: String,
        code: i32,
        stderr: String,
    },

    #[error("{command}: killed by signal {signal}: {stderr}")]
    Signalled {
        command: String,
        signal: i32,
        stderr: String,
    },

    #[error("{command}: copying file to stdin failed: {reason}")]
    StdinForward { command: String, reason: String },

    #[error("{0}: No such device or address")]
    DeviceNotFound(String),

    #[error("{device}: {source}")]
    DeviceOpen {
        device: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{descriptor}: {reason}")]
    MalformedDescriptor { descriptor: String, reason: String },

    #[error("{path}: {reason}")]
    SandboxViolation { path: String, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SysError {
    pub(crate) fn exhausted(context: impl Into<String>, source: std::io::Error) -> Self {
        SysError::ResourceExhausted {
            context: context.into(),
            source,
            fatal: false,
        }
    }

    pub(crate) fn fatal(context: impl Into<String>, source: std::io::Error) -> Self {
        SysError::ResourceExhausted {
            context: context.into(),
            source,
            fatal: true,
        }
    }

    pub(crate) fn malformed(descriptor: impl Into<String>, reason: impl Into<String>) -> Self {
        SysError::MalformedDescriptor {
            descriptor: descriptor.into(),
            reason: reason.into(),
        }
    }

    /// True when the daemon must stop serving requests.
    ///
    /// Only pipe or process creation failures qualify: descriptors may have
    /// leaked across a failed spawn.
    pub fn is_fatal(&self) -> bool {
        matches!(self, SysError::ResourceExhausted { fatal: true, .. })
    }

    /// Captured stderr of a command that ran, if any
    pub fn stderr(&self) -> Option<&str> {
        match self {
            SysError::NonZeroExit { stderr, .. } | SysError::Signalled { stderr, .. } => {
                Some(stderr)
            }
            _ => None,
        }
    }
}

/// Result type alias for appliance operations
pub type Result<T> = std::result::Result<T, SysError>;
