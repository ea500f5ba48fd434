// src/lib.rs
//
// thermotap: acquire a temperature from a serial line or a CAN bus, keep the
// latest value, and publish it to a telemetry endpoint on a fixed cadence.

#[macro_use]
mod logging;

pub mod cli;
pub mod io;
pub mod lifetime;
pub mod publisher;
pub mod sessions;
pub mod settings;
pub mod store;

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::io::Connector;
use crate::lifetime::Lifetime;
use crate::publisher::{HttpSink, PublishError, PublisherIdentity, TelemetrySink};
use crate::sessions::{BusError, SessionManager, SessionStatsSnapshot, SessionStatus};
use crate::settings::{AppSettings, BusSettings};
use crate::store::LatestValueStore;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("settings: {0}")]
    Settings(String),
    #[error("logging: {0}")]
    Logging(String),
    #[error(transparent)]
    Bus(#[from] BusError),
    #[error(transparent)]
    Publish(#[from] PublishError),
    #[error("runtime: {0}")]
    Runtime(#[from] std::io::Error),
}

// ============================================================================
// Core
// ============================================================================

/// The acquisition core: one latest-value store fed by one session manager.
///
/// This is the whole surface a front end needs: read the current value and
/// start or stop the bus session.
pub struct Core {
    store: Arc<LatestValueStore>,
    sessions: SessionManager,
}

impl Core {
    pub fn new(connector: Arc<dyn Connector>, channel_id: u32) -> Self {
        let store = Arc::new(LatestValueStore::new());
        let sessions = SessionManager::new(connector, store.clone(), channel_id);
        Self { store, sessions }
    }

    pub fn from_settings(settings: &BusSettings) -> Self {
        Self::new(io::connector_for(settings), settings.can_channel_id)
    }

    pub fn store(&self) -> Arc<LatestValueStore> {
        self.store.clone()
    }

    /// Latest reading, NaN until the first successful decode.
    pub fn current_temperature(&self) -> f64 {
        self.store.load()
    }

    pub fn latest_reading(&self) -> Option<f64> {
        self.store.get()
    }

    pub async fn start_session(&self, lifetime: &Lifetime, interface: &str) -> Result<(), BusError> {
        self.sessions.start(lifetime, interface).await
    }

    pub async fn stop_session(&self) -> Result<(), BusError> {
        self.sessions.stop().await
    }

    pub async fn send_frame(&self, frame_id: u32, payload: &[u8], extended: bool) -> Result<(), BusError> {
        self.sessions.send_frame(frame_id, payload, extended).await
    }

    pub fn session_status(&self) -> SessionStatus {
        self.sessions.status()
    }

    pub fn session_stats(&self) -> SessionStatsSnapshot {
        self.sessions.stats()
    }
}

// ============================================================================
// Pipeline
// ============================================================================

/// Run acquisition and publishing until `lifetime` is cancelled.
pub async fn run_pipeline(settings: AppSettings, lifetime: Lifetime) -> Result<(), AppError> {
    let core = Core::from_settings(&settings.bus);

    let sink: Option<Arc<dyn TelemetrySink>> = if settings.telemetry.endpoint.trim().is_empty() {
        tlog!("thermotap", "No telemetry endpoint configured, publishing disabled");
        None
    } else {
        Some(Arc::new(HttpSink::from_settings(&settings.telemetry)?))
    };

    run_core(&core, &settings, sink, lifetime).await
}

async fn run_core(
    core: &Core,
    settings: &AppSettings,
    sink: Option<Arc<dyn TelemetrySink>>,
    lifetime: Lifetime,
) -> Result<(), AppError> {
    // A bus that can't be opened doesn't stop the process
    if let Err(e) = core.start_session(&lifetime, &settings.bus.interface).await {
        tlog!(
            "thermotap",
            "Could not start {} session on {}: {}",
            settings.bus.transport,
            settings.bus.interface,
            e
        );
    }

    let publisher_task = sink.map(|sink| {
        tokio::spawn(publisher::run_publisher(
            lifetime.clone(),
            core.store(),
            sink,
            PublisherIdentity::from_settings(&settings.telemetry),
            Duration::from_secs(settings.telemetry.interval_secs),
        ))
    });

    lifetime.cancelled().await;
    tlog!("thermotap", "Shutting down");

    core.stop_session().await?;
    if let Some(handle) = publisher_task {
        if let Err(e) = handle.await {
            tlog!("thermotap", "Publisher task failed: {}", e);
        }
    }

    tlog!(
        "thermotap",
        "Stopped (last reading: {})",
        core.latest_reading()
            .map(|v| format!("{:.2}", v))
            .unwrap_or_else(|| "none".to_string())
    );
    Ok(())
}

// ============================================================================
// Entry Point
// ============================================================================

/// Parse the command line, load settings and run until Ctrl-C.
pub fn run() -> Result<(), AppError> {
    let options = cli::Options::parse();

    if options.list_ports {
        let ports = io::serial::list_serial_ports().map_err(AppError::Settings)?;
        if ports.is_empty() {
            println!("No serial ports found");
        }
        for port in ports {
            println!(
                "{}\t{}\t{}",
                port.port_name,
                port.port_type,
                port.product.unwrap_or_default()
            );
        }
        return Ok(());
    }

    let path = match options.config.clone() {
        Some(path) => path,
        None => settings::default_settings_path().map_err(AppError::Settings)?,
    };
    let mut app_settings = settings::load_settings(&path).map_err(AppError::Settings)?;
    options.apply(&mut app_settings);
    app_settings.validate().map_err(AppError::Settings)?;

    if let Some(ref dir) = app_settings.log_dir {
        logging::init_file_logging(&PathBuf::from(dir)).map_err(AppError::Logging)?;
    }
    tlog!(
        "thermotap",
        "Using {} ({} on {})",
        path.display(),
        app_settings.bus.transport,
        app_settings.bus.interface
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    let result = runtime.block_on(async move {
        let lifetime = Lifetime::new();
        let signal_lifetime = lifetime.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    tlog!("thermotap", "Interrupt received");
                    signal_lifetime.cancel();
                }
                Err(e) => tlog!("thermotap", "Failed to listen for Ctrl-C: {}", e),
            }
        });

        run_pipeline(app_settings, lifetime).await
    });

    logging::stop_file_logging();
    result
}
