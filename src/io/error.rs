// src/io/error.rs
//
// Typed transport errors. Every variant carries the device label
// (e.g. "serial(/dev/ttyUSB0)", "socketcan(can0)") so log lines and
// propagated errors identify the bus they came from.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum IoError {
    /// The transport could not be opened.
    #[error("{device}: connection failed: {detail}")]
    Connection { device: String, detail: String },
    /// A read failed for a reason other than a timeout.
    #[error("{device}: read failed: {detail}")]
    Read { device: String, detail: String },
    /// A write/transmit failed.
    #[error("{device}: write failed: {detail}")]
    Write { device: String, detail: String },
    /// Malformed data or invalid parameters for the protocol.
    #[error("{device}: protocol error: {detail}")]
    Protocol { device: String, detail: String },
    #[error("{device}: {detail}")]
    Unsupported { device: String, detail: String },
    /// The device went away (EOF on the port).
    #[error("{device}: disconnected")]
    Disconnected { device: String },
}

impl IoError {
    pub fn connection(device: &str, detail: impl Into<String>) -> Self {
        Self::Connection {
            device: device.to_string(),
            detail: detail.into(),
        }
    }

    pub fn read(device: &str, detail: impl Into<String>) -> Self {
        Self::Read {
            device: device.to_string(),
            detail: detail.into(),
        }
    }

    pub fn write(device: &str, detail: impl Into<String>) -> Self {
        Self::Write {
            device: device.to_string(),
            detail: detail.into(),
        }
    }

    pub fn protocol(device: &str, detail: impl Into<String>) -> Self {
        Self::Protocol {
            device: device.to_string(),
            detail: detail.into(),
        }
    }

    pub fn unsupported(device: &str, detail: impl Into<String>) -> Self {
        Self::Unsupported {
            device: device.to_string(),
            detail: detail.into(),
        }
    }

    pub fn disconnected(device: &str) -> Self {
        Self::Disconnected {
            device: device.to_string(),
        }
    }
}
