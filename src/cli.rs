// src/cli.rs
//
// Command-line options. Anything given here overrides the settings file for
// this run only; the file itself is never rewritten with CLI values.

use clap::Parser;
use std::path::PathBuf;

use crate::io::TransportKind;
use crate::settings::AppSettings;

#[derive(Parser, Debug, Clone, Default)]
#[command(author, about, version)]
pub struct Options {
    /// Settings file (.json or .toml). Defaults to <config dir>/thermotap/settings.json
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Bus transport: serial or socketcan
    #[arg(short, long)]
    pub transport: Option<TransportKind>,

    /// Serial port path or CAN interface name
    #[arg(short, long)]
    pub interface: Option<String>,

    /// CAN arbitration ID carrying the temperature (hex with 0x prefix, or decimal)
    #[arg(long, value_parser = parse_frame_id, value_name = "ID")]
    pub channel_id: Option<u32>,

    /// Telemetry endpoint URL. An empty string disables publishing.
    #[arg(long)]
    pub endpoint: Option<String>,

    /// Directory for log files
    #[arg(long, value_name = "DIR")]
    pub log_dir: Option<PathBuf>,

    /// List available serial ports and exit
    #[arg(long)]
    pub list_ports: bool,
}

impl Options {
    /// Layer CLI overrides onto loaded settings.
    pub fn apply(&self, settings: &mut AppSettings) {
        if let Some(transport) = self.transport {
            settings.bus.transport = transport;
        }
        if let Some(ref interface) = self.interface {
            settings.bus.interface = interface.clone();
        }
        if let Some(id) = self.channel_id {
            settings.bus.can_channel_id = id;
        }
        if let Some(ref endpoint) = self.endpoint {
            settings.telemetry.endpoint = endpoint.clone();
        }
        if let Some(ref dir) = self.log_dir {
            settings.log_dir = Some(dir.to_string_lossy().to_string());
        }
    }
}

/// Parse a CAN ID given as `0x1A0` or `416`.
pub fn parse_frame_id(s: &str) -> Result<u32, String> {
    let s = s.trim();
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => s.parse::<u32>(),
    };
    let id = parsed.map_err(|e| format!("invalid CAN ID '{}': {}", s, e))?;
    if id > 0x1FFF_FFFF {
        return Err(format!("CAN ID 0x{:X} exceeds 29 bits", id));
    }
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_frame_id() {
        assert_eq!(parse_frame_id("0x100"), Ok(0x100));
        assert_eq!(parse_frame_id("0X1a0"), Ok(0x1A0));
        assert_eq!(parse_frame_id("256"), Ok(256));
        assert!(parse_frame_id("0x2000_0000").is_err());
        assert!(parse_frame_id("0x20000000").is_err());
        assert!(parse_frame_id("temp").is_err());
    }

    #[test]
    fn test_overrides_apply() {
        let options = Options::try_parse_from([
            "thermotap",
            "--transport",
            "socketcan",
            "-i",
            "can1",
            "--channel-id",
            "0x321",
            "--endpoint",
            "",
            "--log-dir",
            "/tmp/thermotap-logs",
        ])
        .unwrap();

        let mut settings = AppSettings::default();
        settings.telemetry.endpoint = "https://example.invalid".to_string();
        options.apply(&mut settings);

        assert_eq!(settings.bus.transport, TransportKind::SocketCan);
        assert_eq!(settings.bus.interface, "can1");
        assert_eq!(settings.bus.can_channel_id, 0x321);
        assert!(settings.telemetry.endpoint.is_empty());
        assert_eq!(settings.log_dir.as_deref(), Some("/tmp/thermotap-logs"));
    }

    #[test]
    fn test_no_overrides_keeps_settings() {
        let options = Options::try_parse_from(["thermotap"]).unwrap();
        let mut settings = AppSettings::default();
        options.apply(&mut settings);
        assert_eq!(settings, AppSettings::default());
        assert!(!options.list_ports);
    }

    #[test]
    fn test_rejects_unknown_transport() {
        assert!(Options::try_parse_from(["thermotap", "--transport", "usb"]).is_err());
    }
}
