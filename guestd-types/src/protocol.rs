// SPDX-License-Identifier: GPL-3.0-only

//! Request and reply messages exchanged with the host library
//!
//! Each message travels in one transport frame as a JSON document. The
//! framing itself lives in the service crate.

use serde::{Deserialize, Serialize};

use crate::Result;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    /// Echoed back in the reply so the host can match them up
    pub serial: u32,
    pub call: Call,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "name", content = "args", rename_all = "snake_case")]
pub enum Call {
    Ping,
    Command { argv: Vec<String> },
    CommandLines { argv: Vec<String> },
    Sh { command: String },
    ShLines { command: String },
    Head { path: String },
    HeadN { lines: i64, path: String },
    Tail { path: String },
    TailN { lines: i64, path: String },
    ListDevices,
    CanonicalDeviceName { device: String },
    DeviceIndex { device: String },
    MountableDevice { mountable: String },
    MountableSubvolume { mountable: String },
    UdevSettle,
}

impl Call {
    /// Procedure name used in logs and error messages
    pub fn name(&self) -> &'static str {
        match self {
            Call::Ping => "ping",
            Call::Command { .. } => "command",
            Call::CommandLines { .. } => "command_lines",
            Call::Sh { .. } => "sh",
            Call::ShLines { .. } => "sh_lines",
            Call::Head { .. } => "head",
            Call::HeadN { .. } => "head_n",
            Call::Tail { .. } => "tail",
            Call::TailN { .. } => "tail_n",
            Call::ListDevices => "list_devices",
            Call::CanonicalDeviceName { .. } => "canonical_device_name",
            Call::DeviceIndex { .. } => "device_index",
            Call::MountableDevice { .. } => "mountable_device",
            Call::MountableSubvolume { .. } => "mountable_subvolume",
            Call::UdevSettle => "udev_settle",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ReplyValue {
    Unit,
    Int(i64),
    String(String),
    Strings(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reply {
    pub serial: u32,
    pub result: std::result::Result<ReplyValue, String>,
}

impl Request {
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    pub fn to_vec(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}

impl Reply {
    pub fn ok(serial: u32, value: ReplyValue) -> Self {
        Self {
            serial,
            result: Ok(value),
        }
    }

    pub fn error(serial: u32, message: impl Into<String>) -> Self {
        Self {
            serial,
            result: Err(message.into()),
        }
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    pub fn to_vec(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}
