// src/io/socketcan/codec.rs
//
// CAN payload decoder.
//
// Two firmware payload layouts are accepted on the temperature channel:
// - float32 little-endian in bytes 0..4
// - int16 little-endian hundredths of a degree in bytes 0..2
//
// The float32 layout is tried first. A non-finite float falls through to the
// int16 layout, which is only accepted inside the plausible physical range.

use crate::io::codec::DecodeError;
use crate::io::BusFrame;

/// Decoder protocol constants
pub mod consts {
    /// Shortest payload that carries a reading
    pub const MIN_PAYLOAD_LEN: usize = 2;
    /// Payload length needed for the float32 layout
    pub const FLOAT_PAYLOAD_LEN: usize = 4;
    /// Fixed-point scale of the int16 layout
    pub const FIXED_POINT_SCALE: f64 = 100.0;
    /// Inclusive plausible range for the int16 layout
    pub const FIXED_POINT_MIN: f64 = -100.0;
    pub const FIXED_POINT_MAX: f64 = 200.0;
}

/// Decode a CAN data payload into degrees.
pub fn decode_payload(payload: &[u8]) -> Result<f64, DecodeError> {
    if payload.len() < consts::MIN_PAYLOAD_LEN {
        return Err(DecodeError::FrameTooShort(payload.len()));
    }

    if payload.len() >= consts::FLOAT_PAYLOAD_LEN {
        let value = f32::from_le_bytes([payload[0], payload[1], payload[2], payload[3]]);
        if value.is_finite() {
            return Ok(value as f64);
        }
    }

    let raw = i16::from_le_bytes([payload[0], payload[1]]);
    let value = raw as f64 / consts::FIXED_POINT_SCALE;
    if (consts::FIXED_POINT_MIN..=consts::FIXED_POINT_MAX).contains(&value) {
        return Ok(value);
    }

    Err(DecodeError::UnrecognizedFormat)
}

/// Decode the payload of a received frame, truncated to its DLC.
pub fn decode_frame(frame: &BusFrame) -> Result<f64, DecodeError> {
    decode_payload(frame.payload())
}
