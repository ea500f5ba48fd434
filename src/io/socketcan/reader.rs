// src/io/socketcan/reader.rs
//
// SocketCAN transport for Linux native CAN interfaces.
//
// Requires the interface to be configured first:
//   sudo ip link set can0 up type can bitrate 500000
//
// On other platforms opening a SocketCAN interface fails with Unsupported.

use std::time::Duration;

use crate::settings::BusSettings;

/// Opens SocketCAN interfaces by name (e.g. "can0", "vcan0")
#[derive(Clone, Debug)]
pub struct SocketCanConnector {
    /// Per-read timeout. Bounds how long a stop request waits for the loop.
    pub read_timeout: Duration,
}

impl SocketCanConnector {
    pub fn from_settings(settings: &BusSettings) -> Self {
        Self {
            read_timeout: Duration::from_millis(settings.read_timeout_ms),
        }
    }
}

#[cfg(target_os = "linux")]
mod linux_impl {
    use socketcan::{
        CanAnyFrame, CanDataFrame, CanFdSocket, EmbeddedFrame, ExtendedId, Frame, Id, Socket,
        SocketOptions, StandardId,
    };
    use std::time::Duration;

    use super::SocketCanConnector;
    use crate::io::{
        now_us, BusFrame, BusTransport, BusUnit, CanTransmitFrame, Connector, IoError,
        TransportKind,
    };

    impl Connector for SocketCanConnector {
        fn kind(&self) -> TransportKind {
            TransportKind::SocketCan
        }

        fn open(&self, interface: &str) -> Result<Box<dyn BusTransport>, IoError> {
            let device = format!("socketcan({})", interface);

            // FD socket reads both classic CAN and CAN FD frames
            let socket = CanFdSocket::open(interface)
                .map_err(|e| IoError::connection(&device, e.to_string()))?;
            configure_socket(&socket, self.read_timeout, &device)?;

            tlog!(
                "socketcan",
                "Opened {} (read timeout {:?})",
                interface,
                self.read_timeout
            );

            Ok(Box::new(SocketCanTransport {
                device,
                socket: Some(socket),
            }))
        }
    }

    /// Apply the read timeout and subscribe to bus error frames.
    /// The kernel delivers no error frames until the error mask is set.
    fn configure_socket(
        socket: &CanFdSocket,
        read_timeout: Duration,
        device: &str,
    ) -> Result<(), IoError> {
        socket
            .set_read_timeout(read_timeout)
            .map_err(|e| IoError::protocol(device, format!("set read timeout: {}", e)))?;
        socket
            .set_error_filter_accept_all()
            .map_err(|e| IoError::protocol(device, format!("set error filter: {}", e)))?;
        Ok(())
    }

    /// An open SocketCAN interface
    pub struct SocketCanTransport {
        device: String,
        socket: Option<CanFdSocket>,
    }

    /// Convert a received frame to a bus unit. Remote frames carry no reading.
    fn convert_any_frame(frame: CanAnyFrame) -> Option<BusUnit> {
        match frame {
            CanAnyFrame::Normal(f) => Some(BusUnit::Frame(BusFrame {
                frame_id: f.raw_id() & 0x1FFF_FFFF,
                dlc: f.len() as u8,
                bytes: f.data().to_vec(),
                is_extended: f.is_extended(),
                timestamp_us: now_us(),
            })),
            CanAnyFrame::Fd(f) => Some(BusUnit::Frame(BusFrame {
                frame_id: f.raw_id() & 0x1FFF_FFFF,
                dlc: f.len() as u8,
                bytes: f.data().to_vec(),
                is_extended: f.is_extended(),
                timestamp_us: now_us(),
            })),
            CanAnyFrame::Remote(_) => None,
            CanAnyFrame::Error(f) => Some(BusUnit::ErrorFrame(format!(
                "error class 0x{:08X} data [{}]",
                f.raw_id(),
                hex::encode(f.data())
            ))),
        }
    }

    /// Build a classic data frame for transmission
    fn build_data_frame(frame: &CanTransmitFrame) -> Result<CanDataFrame, String> {
        let id = if frame.is_extended {
            Id::Extended(
                ExtendedId::new(frame.frame_id)
                    .ok_or_else(|| format!("Invalid extended ID: 0x{:08X}", frame.frame_id))?,
            )
        } else {
            let raw = u16::try_from(frame.frame_id)
                .map_err(|_| format!("Invalid standard ID: 0x{:03X}", frame.frame_id))?;
            Id::Standard(
                StandardId::new(raw)
                    .ok_or_else(|| format!("Invalid standard ID: 0x{:03X}", frame.frame_id))?,
            )
        };
        CanDataFrame::new(id, &frame.data).ok_or_else(|| "Failed to create data frame".to_string())
    }

    impl BusTransport for SocketCanTransport {
        fn kind(&self) -> TransportKind {
            TransportKind::SocketCan
        }

        fn device(&self) -> &str {
            &self.device
        }

        fn read_unit(&mut self) -> Result<Option<BusUnit>, IoError> {
            let socket = self
                .socket
                .as_ref()
                .ok_or_else(|| IoError::read(&self.device, "socket is closed"))?;

            match socket.read_frame() {
                Ok(frame) => Ok(convert_any_frame(frame)),
                Err(ref e)
                    if e.kind() == std::io::ErrorKind::WouldBlock
                        || e.kind() == std::io::ErrorKind::TimedOut =>
                {
                    Ok(None)
                }
                Err(e) => Err(IoError::read(&self.device, e.to_string())),
            }
        }

        fn transmit(&mut self, frame: &CanTransmitFrame) -> Result<(), IoError> {
            let socket = self
                .socket
                .as_ref()
                .ok_or_else(|| IoError::write(&self.device, "socket is closed"))?;
            let data_frame =
                build_data_frame(frame).map_err(|e| IoError::protocol(&self.device, e))?;
            socket
                .write_frame(&data_frame)
                .map_err(|e| IoError::write(&self.device, e.to_string()))
        }

        fn close(&mut self) {
            if self.socket.take().is_some() {
                tlog!("socketcan", "Closed {}", self.device);
            }
        }
    }

}

#[cfg(target_os = "linux")]
pub use linux_impl::SocketCanTransport;

// ============================================================================
// Non-Linux Stub
// ============================================================================

#[cfg(not(target_os = "linux"))]
mod stub {
    use super::SocketCanConnector;
    use crate::io::{BusTransport, Connector, IoError, TransportKind};

    impl Connector for SocketCanConnector {
        fn kind(&self) -> TransportKind {
            TransportKind::SocketCan
        }

        fn open(&self, interface: &str) -> Result<Box<dyn BusTransport>, IoError> {
            Err(IoError::unsupported(
                &format!("socketcan({})", interface),
                "SocketCAN is only available on Linux",
            ))
        }
    }
}
