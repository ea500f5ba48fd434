// src/io/serial/utils.rs
//
// Line settings for serial ports and their mapping onto the serialport crate.

use serde::{Deserialize, Serialize};
use serialport::{DataBits, Parity as SpParity, StopBits};

/// Parity setting for serial port configuration
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Parity {
    #[default]
    None,
    Odd,
    Even,
}

impl Parity {
    /// Single-letter form used in "8N1"-style summaries
    pub fn letter(self) -> char {
        match self {
            Parity::None => 'N',
            Parity::Odd => 'O',
            Parity::Even => 'E',
        }
    }
}

pub fn to_serialport_parity(p: Parity) -> SpParity {
    match p {
        Parity::None => SpParity::None,
        Parity::Odd => SpParity::Odd,
        Parity::Even => SpParity::Even,
    }
}

/// Unsupported widths fall back to eight bits
pub fn to_serialport_data_bits(bits: u8) -> DataBits {
    match bits {
        5 => DataBits::Five,
        6 => DataBits::Six,
        7 => DataBits::Seven,
        _ => DataBits::Eight,
    }
}

pub fn to_serialport_stop_bits(bits: u8) -> StopBits {
    match bits {
        2 => StopBits::Two,
        _ => StopBits::One,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parity_serde_and_letter() {
        let p: Parity = serde_json::from_str("\"even\"").unwrap();
        assert_eq!(p, Parity::Even);
        assert_eq!(p.letter(), 'E');
        assert_eq!(Parity::default(), Parity::None);
    }

    #[test]
    fn test_line_setting_conversions() {
        assert!(matches!(to_serialport_parity(Parity::Odd), SpParity::Odd));
        assert!(matches!(to_serialport_data_bits(7), DataBits::Seven));
        assert!(matches!(to_serialport_data_bits(9), DataBits::Eight));
        assert!(matches!(to_serialport_stop_bits(2), StopBits::Two));
        assert!(matches!(to_serialport_stop_bits(0), StopBits::One));
    }
}
