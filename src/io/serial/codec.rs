// src/io/serial/codec.rs
//
// Text line decoder. A line is either a bare float literal ("18.5") or a
// JSON object carrying a numeric "temp" field ({"temp": 18.5}). No range
// check is applied; any finite value is accepted.

use serde::Deserialize;

use crate::io::codec::DecodeError;

/// Structured line record
#[derive(Debug, Deserialize)]
struct TempRecord {
    temp: f64,
}

/// Decode one serial line into a reading.
pub fn decode_line(line: &str) -> Result<f64, DecodeError> {
    let line = line.trim();

    if line.starts_with('{') {
        let record: TempRecord = serde_json::from_str(line)
            .map_err(|e| DecodeError::MalformedRecord(e.to_string()))?;
        return Ok(record.temp);
    }

    match line.parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(value),
        Ok(_) => Err(DecodeError::InvalidNumber(format!("'{}' is not finite", line))),
        Err(e) => Err(DecodeError::InvalidNumber(format!("'{}': {}", line, e))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_float() {
        assert_eq!(decode_line("18.5"), Ok(18.5));
        assert_eq!(decode_line("-4"), Ok(-4.0));
        assert_eq!(decode_line("1e2"), Ok(100.0));
    }

    #[test]
    fn test_record() {
        assert_eq!(decode_line("{\"temp\": 19.25}"), Ok(19.25));
        assert_eq!(decode_line("{\"temp\":-3,\"unit\":\"C\"}"), Ok(-3.0));
    }

    #[test]
    fn test_whitespace_is_immaterial() {
        for line in ["  18.5", "18.5\t", " \r18.5 \r", "  {\"temp\": 18.5}  "] {
            assert_eq!(decode_line(line), Ok(18.5), "line {:?}", line);
        }
    }

    #[test]
    fn test_no_range_check() {
        assert_eq!(decode_line("5000.5"), Ok(5000.5));
        assert_eq!(decode_line("-273.15"), Ok(-273.15));
    }

    #[test]
    fn test_invalid_number() {
        assert!(matches!(decode_line("notanumber"), Err(DecodeError::InvalidNumber(_))));
        assert!(matches!(decode_line("18.5C"), Err(DecodeError::InvalidNumber(_))));
        assert!(matches!(decode_line(""), Err(DecodeError::InvalidNumber(_))));
    }

    #[test]
    fn test_non_finite_rejected() {
        for line in ["NaN", "inf", "-infinity"] {
            assert!(
                matches!(decode_line(line), Err(DecodeError::InvalidNumber(_))),
                "line {:?}",
                line
            );
        }
    }

    #[test]
    fn test_malformed_record() {
        for line in ["{\"temp\": }", "{temp: 18.5}", "{\"temp\": \"18.5\"}", "{\"humidity\": 40}", "{"] {
            assert!(
                matches!(decode_line(line), Err(DecodeError::MalformedRecord(_))),
                "line {:?}",
                line
            );
        }
    }
}
