// src/io/codec.rs
//
// Decode errors shared by the transport-specific decoders.
//
// Each transport's decoder lives in its driver module:
// - serial/codec.rs - text lines ("18.5" or {"temp": 18.5})
// - socketcan/codec.rs - binary CAN payloads (float32 LE or int16 LE hundredths)
//
// Decoders are pure: one input unit in, one calibrated reading or a
// DecodeError out. A decode failure only ever drops that unit.

use thiserror::Error;

/// Per-unit decode failures. Always recoverable.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DecodeError {
    /// A `{...}` line that is not a valid `{"temp": <number>}` record
    #[error("malformed record: {0}")]
    MalformedRecord(String),
    /// A bare line that is not a finite number
    #[error("invalid number: {0}")]
    InvalidNumber(String),
    /// A CAN payload with fewer than 2 bytes
    #[error("frame too short: {0} bytes, need at least 2")]
    FrameTooShort(usize),
    /// A CAN payload matching neither the float32 nor the int16 layout
    #[error("unrecognized payload format")]
    UnrecognizedFormat,
}
