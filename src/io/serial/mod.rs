// src/io/serial/mod.rs
//
// Serial port driver for line-oriented temperature sensors.
//
// Features:
// - Newline framing with a runaway-line guard (framer.rs)
// - Text reading decoder: bare floats or {"temp": <float>} records (codec.rs)
// - Blocking port reads with a short timeout so cancellation is observed promptly

pub mod codec;
pub mod framer;
mod reader;
pub(crate) mod utils;

pub use codec::decode_line;
pub use framer::LineFramer;
pub use reader::{list_serial_ports, SerialConnector, SerialPortInfo, SerialTransport};
pub use utils::Parity;
