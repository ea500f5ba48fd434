// src/io/socketcan/mod.rs
//
// SocketCAN driver for Linux native CAN interfaces.
// Receives temperature frames on the configured channel ID and transmits
// classic data frames on request.
//
// This module is only fully functional on Linux.

pub mod codec;
mod reader;

pub use codec::{decode_frame, decode_payload};
pub use reader::SocketCanConnector;
#[cfg(target_os = "linux")]
pub use reader::SocketCanTransport;
