// src/io/mod.rs
//
// Bus transport abstraction for temperature acquisition.
// Serial ports and SocketCAN interfaces are two variants of one capability:
// a source that yields either raw byte chunks or whole CAN frames, can
// (optionally) transmit, and can be closed.

// Core modules
pub mod codec; // DecodeError
mod error;
mod types;

// Transport drivers
pub mod serial;
pub mod socketcan;

#[cfg(test)]
pub(crate) mod mock;

pub use codec::DecodeError;
pub use error::IoError;
pub use types::{TransmitRequest, TransmitSender};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::settings::BusSettings;

// ============================================================================
// Shared Types
// ============================================================================

/// Which physical bus a session talks to
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Line-oriented serial stream
    Serial,
    /// Linux SocketCAN interface
    #[serde(alias = "can")]
    SocketCan,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportKind::Serial => f.write_str("serial"),
            TransportKind::SocketCan => f.write_str("socketcan"),
        }
    }
}

impl std::str::FromStr for TransportKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "serial" => Ok(TransportKind::Serial),
            "socketcan" | "can" => Ok(TransportKind::SocketCan),
            other => Err(format!("Unknown transport '{}' (expected serial or socketcan)", other)),
        }
    }
}

/// A received CAN data frame
#[derive(Clone, Debug, PartialEq)]
pub struct BusFrame {
    /// Arbitration ID (11-bit standard or 29-bit extended)
    pub frame_id: u32,
    /// Declared data length
    pub dlc: u8,
    pub bytes: Vec<u8>,
    pub is_extended: bool,
    /// Host UNIX timestamp in microseconds.
    pub timestamp_us: u64,
}

impl BusFrame {
    /// Payload truncated to the declared length.
    pub fn payload(&self) -> &[u8] {
        let len = (self.dlc as usize).min(self.bytes.len());
        &self.bytes[..len]
    }
}

/// CAN frame for transmission
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CanTransmitFrame {
    /// CAN frame ID (11-bit standard or 29-bit extended)
    pub frame_id: u32,
    /// Frame data (up to 8 bytes)
    pub data: Vec<u8>,
    /// Extended (29-bit) frame ID
    pub is_extended: bool,
}

/// One unit of input from a transport
#[derive(Clone, Debug, PartialEq)]
pub enum BusUnit {
    /// Bytes from a single serial read
    Bytes(Vec<u8>),
    /// A CAN data frame
    Frame(BusFrame),
    /// A bus-level error frame, already described for logging
    ErrorFrame(String),
}

/// Get current time in microseconds since UNIX epoch
pub fn now_us() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or(0)
}

// ============================================================================
// Transport Traits
// ============================================================================

/// An open connection to a bus. Owned by exactly one receive loop.
pub trait BusTransport: Send {
    fn kind(&self) -> TransportKind;

    /// Device label used in logs and errors, e.g. "serial(/dev/ttyUSB0)"
    fn device(&self) -> &str;

    /// Block for the next unit of input.
    /// Returns `Ok(None)` when the read timed out with nothing to report.
    fn read_unit(&mut self) -> Result<Option<BusUnit>, IoError>;

    /// Transmit a frame. Only CAN transports support this.
    fn transmit(&mut self, frame: &CanTransmitFrame) -> Result<(), IoError> {
        let _ = frame;
        Err(IoError::unsupported(self.device(), "transmit is not supported"))
    }

    /// Release the underlying handle. Further reads fail.
    fn close(&mut self);
}

/// Opens transports of one kind by interface name.
pub trait Connector: Send + Sync {
    fn kind(&self) -> TransportKind;

    fn open(&self, interface: &str) -> Result<Box<dyn BusTransport>, IoError>;
}

/// Build the connector selected by configuration.
pub fn connector_for(settings: &BusSettings) -> Arc<dyn Connector> {
    match settings.transport {
        TransportKind::Serial => Arc::new(serial::SerialConnector::from_settings(settings)),
        TransportKind::SocketCan => Arc::new(socketcan::SocketCanConnector::from_settings(settings)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_kind_parse() {
        assert_eq!("serial".parse::<TransportKind>(), Ok(TransportKind::Serial));
        assert_eq!("SocketCAN".parse::<TransportKind>(), Ok(TransportKind::SocketCan));
        assert_eq!("can".parse::<TransportKind>(), Ok(TransportKind::SocketCan));
        assert!("usb".parse::<TransportKind>().is_err());
    }

    #[test]
    fn test_transport_kind_serde() {
        let kind: TransportKind = serde_json::from_str("\"socketcan\"").unwrap();
        assert_eq!(kind, TransportKind::SocketCan);
        assert_eq!(serde_json::to_string(&TransportKind::Serial).unwrap(), "\"serial\"");
    }

    #[test]
    fn test_frame_payload_respects_dlc() {
        let frame = BusFrame {
            frame_id: 0x100,
            dlc: 2,
            bytes: vec![0xE6, 0x09, 0xFF, 0xFF],
            is_extended: false,
            timestamp_us: 0,
        };
        assert_eq!(frame.payload(), &[0xE6, 0x09]);
    }
}
