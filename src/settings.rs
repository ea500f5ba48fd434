// src/settings.rs
//
// Application settings, persisted as JSON (or TOML, chosen by file
// extension). Every field has a serde default so older or hand-trimmed files
// still load.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::io::serial::Parity;
use crate::io::TransportKind;
use crate::publisher::MAX_INTERVAL;

/// Upper bound for `bus.read_timeout_ms`
pub const MAX_READ_TIMEOUT_MS: u64 = 10_000;
/// Upper bound for `telemetry.request_timeout_secs`
pub const MAX_REQUEST_TIMEOUT_SECS: u64 = 300;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct BusSettings {
    #[serde(default = "default_transport")]
    pub transport: TransportKind,
    /// Serial port path or CAN interface name
    #[serde(default = "default_interface")]
    pub interface: String,
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    #[serde(default = "default_data_bits")]
    pub data_bits: u8,
    #[serde(default = "default_stop_bits")]
    pub stop_bits: u8,
    #[serde(default)]
    pub parity: Parity,
    /// Per-read timeout; also the worst-case stop latency
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
    /// Arbitration ID of the temperature frame
    #[serde(default = "default_can_channel_id")]
    pub can_channel_id: u32,
}

fn default_transport() -> TransportKind {
    TransportKind::Serial
}
fn default_interface() -> String {
    if cfg!(target_os = "windows") {
        "COM3".to_string()
    } else {
        "/dev/ttyUSB0".to_string()
    }
}
fn default_baud_rate() -> u32 {
    115_200
}
fn default_data_bits() -> u8 {
    8
}
fn default_stop_bits() -> u8 {
    1
}
fn default_read_timeout_ms() -> u64 {
    100
}
fn default_can_channel_id() -> u32 {
    0x100
}

impl Default for BusSettings {
    fn default() -> Self {
        Self {
            transport: default_transport(),
            interface: default_interface(),
            baud_rate: default_baud_rate(),
            data_bits: default_data_bits(),
            stop_bits: default_stop_bits(),
            parity: Parity::default(),
            read_timeout_ms: default_read_timeout_ms(),
            can_channel_id: default_can_channel_id(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct TelemetrySettings {
    /// POST target. Empty disables publishing.
    #[serde(default)]
    pub endpoint: String,
    #[serde(default)]
    pub bearer_token: String,
    /// Device serial reported in every payload
    #[serde(default)]
    pub device_serial: String,
    #[serde(default)]
    pub access_token: String,
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_interval_secs() -> u64 {
    10
}
fn default_request_timeout_secs() -> u64 {
    10
}

impl Default for TelemetrySettings {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            bearer_token: String::new(),
            device_serial: String::new(),
            access_token: String::new(),
            interval_secs: default_interval_secs(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct AppSettings {
    #[serde(default)]
    pub bus: BusSettings,
    #[serde(default)]
    pub telemetry: TelemetrySettings,
    /// Directory for timestamped log files. None logs to stderr only.
    #[serde(default)]
    pub log_dir: Option<String>,
}

impl AppSettings {
    /// Reject values the pipeline can't run with.
    pub fn validate(&self) -> Result<(), String> {
        if self.bus.interface.trim().is_empty() {
            return Err("bus.interface must not be empty".to_string());
        }
        if self.bus.baud_rate == 0 {
            return Err("bus.baud_rate must be greater than zero".to_string());
        }
        if self.bus.can_channel_id > 0x1FFF_FFFF {
            return Err(format!(
                "bus.can_channel_id 0x{:X} exceeds 29 bits",
                self.bus.can_channel_id
            ));
        }
        if !(1..=MAX_READ_TIMEOUT_MS).contains(&self.bus.read_timeout_ms) {
            return Err(format!(
                "bus.read_timeout_ms must be between 1 and {}",
                MAX_READ_TIMEOUT_MS
            ));
        }
        if !(1..=MAX_INTERVAL.as_secs()).contains(&self.telemetry.interval_secs) {
            return Err(format!(
                "telemetry.interval_secs must be between 1 and {}",
                MAX_INTERVAL.as_secs()
            ));
        }
        if !(1..=MAX_REQUEST_TIMEOUT_SECS).contains(&self.telemetry.request_timeout_secs) {
            return Err(format!(
                "telemetry.request_timeout_secs must be between 1 and {}",
                MAX_REQUEST_TIMEOUT_SECS
            ));
        }
        Ok(())
    }
}

// ============================================================================
// Load / Save
// ============================================================================

/// `<config_dir>/thermotap/settings.json`
pub fn default_settings_path() -> Result<PathBuf, String> {
    let config_dir =
        dirs::config_dir().ok_or_else(|| "Failed to get config dir".to_string())?;
    Ok(config_dir.join("thermotap").join("settings.json"))
}

fn is_toml(path: &Path) -> bool {
    path.extension().and_then(|s| s.to_str()) == Some("toml")
}

/// Load settings from `path`. A missing file is created with defaults.
pub fn load_settings(path: &Path) -> Result<AppSettings, String> {
    if path.exists() {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read settings: {}", e))?;

        if is_toml(path) {
            toml::from_str(&content).map_err(|e| format!("Failed to parse settings: {}", e))
        } else {
            serde_json::from_str(&content)
                .map_err(|e| format!("Failed to parse settings: {}", e))
        }
    } else {
        // First run: write defaults so there is a file to edit
        let settings = AppSettings::default();
        save_settings(path, &settings)?;
        tlog!("settings", "Wrote default settings to {}", path.display());
        Ok(settings)
    }
}

pub fn save_settings(path: &Path, settings: &AppSettings) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config dir: {}", e))?;
    }

    let content = if is_toml(path) {
        toml::to_string_pretty(settings)
            .map_err(|e| format!("Failed to serialize settings: {}", e))?
    } else {
        serde_json::to_string_pretty(settings)
            .map_err(|e| format!("Failed to serialize settings: {}", e))?
    };

    std::fs::write(path, content).map_err(|e| format!("Failed to write settings: {}", e))
}
