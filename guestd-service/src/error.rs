// SPDX-License-Identifier: GPL-3.0-only

use guestd_sys::SysError;
use guestd_types::TypesError;
use thiserror::Error;

/// Errors raised while serving a request
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Sys(#[from] SysError),

    #[error("{0}")]
    InvalidArgument(String),

    #[error("{path}: {source}")]
    Path {
        path: String,
        #[source]
        source: SysError,
    },

    #[error("{0}: you must call 'mount' first to mount the root filesystem")]
    NeedRoot(&'static str),

    #[error("protocol error: {0}")]
    Protocol(#[from] TypesError),

    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),
}

impl ServiceError {
    /// True when the daemon must stop instead of replying.
    pub fn is_fatal(&self) -> bool {
        match self {
            ServiceError::Sys(error) | ServiceError::Path { source: error, .. } => {
                error.is_fatal()
            }
            ServiceError::Transport(_) => true,
            _ => false,
        }
    }

    /// Message sent back to the client in an error reply
    pub fn reply_message(&self, procedure: &str) -> String {
        match self {
            ServiceError::NeedRoot(_) => self.to_string(),
            _ => format!("{procedure}: {self}"),
        }
    }
}

pub type Result<T> = std::result::Result<T, ServiceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_engine_exhaustion_and_transport_are_fatal() {
        assert!(!ServiceError::InvalidArgument("x".into()).is_fatal());
        assert!(!ServiceError::Sys(SysError::DeviceNotFound("/dev/sdz".into())).is_fatal());
        assert!(ServiceError::Transport(std::io::Error::other("gone")).is_fatal());
    }

    #[test]
    fn reply_message_names_the_procedure() {
        let err = ServiceError::Sys(SysError::DeviceNotFound("/dev/sdz".into()));
        assert_eq!(
            err.reply_message("device_index"),
            "device_index: /dev/sdz: No such device or address"
        );
        assert_eq!(
            ServiceError::NeedRoot("sh").reply_message("sh"),
            "sh: you must call 'mount' first to mount the root filesystem"
        );
    }
}
