// src/io/serial/reader.rs
//
// Serial port transport. Each read returns whatever bytes arrived within the
// port timeout; line assembly happens in the session's receive loop.

use serde::Serialize;
use serialport::SerialPort;
use std::io::Read;
use std::time::Duration;

use super::utils::{
    to_serialport_data_bits, to_serialport_parity, to_serialport_stop_bits, Parity,
};
use crate::io::{BusTransport, BusUnit, Connector, IoError, TransportKind};
use crate::settings::BusSettings;

// ============================================================================
// Types and Configuration
// ============================================================================

/// Opens serial ports with fixed line settings
#[derive(Clone, Debug)]
pub struct SerialConnector {
    pub baud_rate: u32,
    pub data_bits: u8,
    pub stop_bits: u8,
    pub parity: Parity,
    /// Per-read timeout. Bounds how long a stop request waits for the loop.
    pub read_timeout: Duration,
}

impl SerialConnector {
    pub fn from_settings(settings: &BusSettings) -> Self {
        Self {
            baud_rate: settings.baud_rate,
            data_bits: settings.data_bits,
            stop_bits: settings.stop_bits,
            parity: settings.parity,
            read_timeout: Duration::from_millis(settings.read_timeout_ms),
        }
    }
}

impl Connector for SerialConnector {
    fn kind(&self) -> TransportKind {
        TransportKind::Serial
    }

    fn open(&self, interface: &str) -> Result<Box<dyn BusTransport>, IoError> {
        let device = format!("serial({})", interface);

        let port = serialport::new(interface, self.baud_rate)
            .data_bits(to_serialport_data_bits(self.data_bits))
            .stop_bits(to_serialport_stop_bits(self.stop_bits))
            .parity(to_serialport_parity(self.parity))
            .timeout(self.read_timeout)
            .open()
            .map_err(|e| IoError::connection(&device, e.to_string()))?;

        tlog!(
            "serial",
            "Opened {} at {} baud ({}-{}-{}, read timeout {:?})",
            interface,
            self.baud_rate,
            self.data_bits,
            self.parity.letter(),
            self.stop_bits,
            self.read_timeout
        );

        Ok(Box::new(SerialTransport {
            device,
            port: Some(port),
            buf: [0u8; 256],
        }))
    }
}

/// An open serial port
pub struct SerialTransport {
    device: String,
    port: Option<Box<dyn SerialPort>>,
    buf: [u8; 256],
}

impl BusTransport for SerialTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Serial
    }

    fn device(&self) -> &str {
        &self.device
    }

    fn read_unit(&mut self) -> Result<Option<BusUnit>, IoError> {
        let port = self
            .port
            .as_mut()
            .ok_or_else(|| IoError::read(&self.device, "port is closed"))?;

        match port.read(&mut self.buf) {
            // EOF - port closed/disconnected
            Ok(0) => Err(IoError::disconnected(&self.device)),
            Ok(n) => Ok(Some(BusUnit::Bytes(self.buf[..n].to_vec()))),
            Err(ref e)
                if matches!(
                    e.kind(),
                    std::io::ErrorKind::TimedOut
                        | std::io::ErrorKind::WouldBlock
                        | std::io::ErrorKind::Interrupted
                ) =>
            {
                Ok(None)
            }
            Err(e) => Err(IoError::read(&self.device, e.to_string())),
        }
    }

    fn close(&mut self) {
        if self.port.take().is_some() {
            tlog!("serial", "Closed {}", self.device);
        }
    }
}

// ============================================================================
// Port Enumeration
// ============================================================================

/// Information about an available serial port
#[derive(Clone, Debug, Serialize)]
pub struct SerialPortInfo {
    pub port_name: String,
    pub port_type: String,
    pub manufacturer: Option<String>,
    pub product: Option<String>,
    pub serial_number: Option<String>,
}

/// List available serial ports.
///
/// On macOS only /dev/cu.* devices are listed; the /dev/tty.* twins block on
/// open waiting for carrier detect.
pub fn list_serial_ports() -> Result<Vec<SerialPortInfo>, String> {
    let ports =
        serialport::available_ports().map_err(|e| format!("Failed to enumerate ports: {}", e))?;

    Ok(ports
        .into_iter()
        .filter(|_p| {
            #[cfg(target_os = "macos")]
            {
                !_p.port_name.starts_with("/dev/tty.")
            }
            #[cfg(not(target_os = "macos"))]
            {
                true
            }
        })
        .map(|p| {
            let (port_type, manufacturer, product, serial_number) = match p.port_type {
                serialport::SerialPortType::UsbPort(info) => (
                    format!("USB {:04x}:{:04x}", info.vid, info.pid),
                    info.manufacturer,
                    info.product,
                    info.serial_number,
                ),
                serialport::SerialPortType::BluetoothPort => {
                    ("Bluetooth".to_string(), None, None, None)
                }
                serialport::SerialPortType::PciPort => ("PCI".to_string(), None, None, None),
                serialport::SerialPortType::Unknown => ("Unknown".to_string(), None, None, None),
            };
            SerialPortInfo {
                port_name: p.port_name,
                port_type,
                manufacturer,
                product,
                serial_number,
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_missing_port_is_connection_error() {
        let connector = SerialConnector::from_settings(&BusSettings::default());
        let err = match connector.open("/dev/thermotap-does-not-exist") {
            Ok(_) => panic!("opening a missing port should fail"),
            Err(e) => e,
        };
        assert!(matches!(err, IoError::Connection { .. }));
        assert!(err.to_string().contains("serial(/dev/thermotap-does-not-exist)"));
    }

    #[test]
    fn test_connector_uses_settings() {
        let settings = BusSettings {
            baud_rate: 9600,
            read_timeout_ms: 250,
            ..BusSettings::default()
        };
        let connector = SerialConnector::from_settings(&settings);
        assert_eq!(connector.baud_rate, 9600);
        assert_eq!(connector.read_timeout, Duration::from_millis(250));
        assert_eq!(connector.kind(), TransportKind::Serial);
    }
}
