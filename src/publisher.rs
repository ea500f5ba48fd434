// src/publisher.rs
//
// Periodic telemetry publisher.
//
// Every interval the latest reading is rounded to two decimals, stamped with
// the current UTC time and POSTed as JSON. Nothing is sent while the store
// still holds the "unknown" sentinel. A failed POST is logged and the next
// tick carries on; there are no retries within a tick.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::{Instant, MissedTickBehavior};

use crate::lifetime::Lifetime;
use crate::settings::TelemetrySettings;
use crate::store::LatestValueStore;

/// UTC timestamp layout expected by the ingest endpoint, e.g. 2024-03-05t07:08:09.123z
pub const DATETIME_FORMAT: &str = "%Y-%m-%dt%H:%M:%S%.3fz";

/// Longest accepted publish interval (one day)
pub const MAX_INTERVAL: Duration = Duration::from_secs(86_400);

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("endpoint returned status {0}")]
    Status(reqwest::StatusCode),
}

// ============================================================================
// Payload
// ============================================================================

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TelemetryData {
    pub temp: f64,
    pub datetime: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TelemetryPayload {
    pub serial: String,
    #[serde(rename = "accessToken")]
    pub access_token: String,
    pub data: TelemetryData,
}

/// Device identity carried in every payload
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PublisherIdentity {
    pub serial: String,
    pub access_token: String,
}

impl PublisherIdentity {
    pub fn from_settings(settings: &TelemetrySettings) -> Self {
        Self {
            serial: settings.device_serial.clone(),
            access_token: settings.access_token.clone(),
        }
    }
}

pub fn format_datetime(at: DateTime<Utc>) -> String {
    at.format(DATETIME_FORMAT).to_string()
}

/// Round half away from zero to hundredths.
pub fn round_reading(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

pub fn build_payload(identity: &PublisherIdentity, reading: f64, at: DateTime<Utc>) -> TelemetryPayload {
    TelemetryPayload {
        serial: identity.serial.clone(),
        access_token: identity.access_token.clone(),
        data: TelemetryData {
            temp: round_reading(reading),
            datetime: format_datetime(at),
        },
    }
}

// ============================================================================
// Sinks
// ============================================================================

/// Destination for telemetry payloads
#[async_trait]
pub trait TelemetrySink: Send + Sync {
    async fn send(&self, payload: &TelemetryPayload) -> Result<(), PublishError>;
}

/// POSTs payloads as JSON with a bearer credential
pub struct HttpSink {
    client: reqwest::Client,
    endpoint: String,
    bearer_token: String,
}

impl HttpSink {
    pub fn new(endpoint: &str, bearer_token: &str, timeout: Duration) -> Result<Self, PublishError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("thermotap/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
            bearer_token: bearer_token.to_string(),
        })
    }

    pub fn from_settings(settings: &TelemetrySettings) -> Result<Self, PublishError> {
        Self::new(
            &settings.endpoint,
            &settings.bearer_token,
            Duration::from_secs(settings.request_timeout_secs),
        )
    }
}

#[async_trait]
impl TelemetrySink for HttpSink {
    async fn send(&self, payload: &TelemetryPayload) -> Result<(), PublishError> {
        let mut request = self.client.post(&self.endpoint).json(payload);
        if !self.bearer_token.is_empty() {
            request = request.bearer_auth(&self.bearer_token);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(PublishError::Status(response.status()));
        }
        Ok(())
    }
}

// ============================================================================
// Publish Loop
// ============================================================================

#[derive(Clone, Debug, PartialEq)]
pub enum PublishOutcome {
    /// No valid reading yet
    Skipped,
    /// Sent the rounded reading
    Sent(f64),
    Failed,
}

/// Publish the current reading once.
pub async fn publish_once(
    store: &LatestValueStore,
    sink: &dyn TelemetrySink,
    identity: &PublisherIdentity,
) -> PublishOutcome {
    let reading = match store.get() {
        Some(v) => v,
        None => return PublishOutcome::Skipped,
    };

    let payload = build_payload(identity, reading, Utc::now());
    match sink.send(&payload).await {
        Ok(()) => PublishOutcome::Sent(payload.data.temp),
        Err(e) => {
            tlog!("publisher", "Publish of {} failed: {}", payload.data.temp, e);
            PublishOutcome::Failed
        }
    }
}

/// Publish every `interval` until `lifetime` is cancelled.
/// The first publish happens one full interval after start.
/// `interval` is clamped to `1ms..=MAX_INTERVAL`.
pub async fn run_publisher(
    lifetime: Lifetime,
    store: Arc<LatestValueStore>,
    sink: Arc<dyn TelemetrySink>,
    identity: PublisherIdentity,
    interval: Duration,
) {
    let interval = interval.clamp(Duration::from_millis(1), MAX_INTERVAL);
    let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    tlog!("publisher", "Publishing every {:?}", interval);
    let mut skipped = 0u64;

    loop {
        tokio::select! {
            _ = lifetime.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let outcome = tokio::select! {
            _ = lifetime.cancelled() => break,
            outcome = publish_once(&store, sink.as_ref(), &identity) => outcome,
        };
        if outcome == PublishOutcome::Skipped {
            skipped += 1;
        }
    }

    tlog!("publisher", "Stopped ({} ticks skipped without a reading)", skipped);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSink {
        sent: Mutex<Vec<TelemetryPayload>>,
        fail: bool,
    }

    impl RecordingSink {
        fn failing() -> Self {
            Self {
                fail: true,
                ..Self::default()
            }
        }

        fn count(&self) -> usize {
            self.sent.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl TelemetrySink for RecordingSink {
        async fn send(&self, payload: &TelemetryPayload) -> Result<(), PublishError> {
            self.sent.lock().unwrap().push(payload.clone());
            if self.fail {
                Err(PublishError::Status(reqwest::StatusCode::INTERNAL_SERVER_ERROR))
            } else {
                Ok(())
            }
        }
    }

    fn identity() -> PublisherIdentity {
        PublisherIdentity {
            serial: "TT-0001".to_string(),
            access_token: "tok".to_string(),
        }
    }

    fn spawn_publisher(
        store: &Arc<LatestValueStore>,
        sink: &Arc<RecordingSink>,
    ) -> (Lifetime, tokio::task::JoinHandle<()>) {
        let lifetime = Lifetime::new();
        let handle = tokio::spawn(run_publisher(
            lifetime.clone(),
            store.clone(),
            sink.clone(),
            identity(),
            Duration::from_secs(10),
        ));
        (lifetime, handle)
    }

    #[test]
    fn test_datetime_format() {
        let at = chrono::NaiveDate::from_ymd_opt(2024, 3, 5)
            .unwrap()
            .and_hms_milli_opt(7, 8, 9, 123)
            .unwrap()
            .and_utc();
        assert_eq!(format_datetime(at), "2024-03-05t07:08:09.123z");
    }

    #[test]
    fn test_round_reading() {
        assert_eq!(round_reading(21.456), 21.46);
        assert_eq!(round_reading(19.25), 19.25);
        assert_eq!(round_reading(-3.14159), -3.14);
        assert_eq!(round_reading(25.0), 25.0);
    }

    #[test]
    fn test_payload_json_shape() {
        let at = chrono::NaiveDate::from_ymd_opt(2024, 1, 2)
            .unwrap()
            .and_hms_milli_opt(3, 4, 5, 6)
            .unwrap()
            .and_utc();
        let payload = build_payload(&identity(), 18.499, at);
        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "serial": "TT-0001",
                "accessToken": "tok",
                "data": {"temp": 18.5, "datetime": "2024-01-02t03:04:05.006z"}
            })
        );
    }

    #[tokio::test]
    async fn test_publish_once_skips_unknown() {
        let store = LatestValueStore::new();
        let sink = RecordingSink::default();
        assert_eq!(
            publish_once(&store, &sink, &identity()).await,
            PublishOutcome::Skipped
        );
        assert_eq!(sink.count(), 0);

        store.store(22.125);
        assert_eq!(
            publish_once(&store, &sink, &identity()).await,
            PublishOutcome::Sent(22.13)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_publishes_every_interval() {
        let store = Arc::new(LatestValueStore::new());
        store.store(21.456);
        let sink = Arc::new(RecordingSink::default());
        let (lifetime, handle) = spawn_publisher(&store, &sink);

        // Nothing before the first full interval
        tokio::time::sleep(Duration::from_secs(9)).await;
        assert_eq!(sink.count(), 0);

        tokio::time::sleep(Duration::from_secs(26)).await;
        assert_eq!(sink.count(), 3);
        assert!(sink.sent.lock().unwrap().iter().all(|p| p.data.temp == 21.46));

        lifetime.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_publish_without_reading() {
        let store = Arc::new(LatestValueStore::new());
        let sink = Arc::new(RecordingSink::default());
        let (lifetime, handle) = spawn_publisher(&store, &sink);

        tokio::time::sleep(Duration::from_secs(35)).await;
        assert_eq!(sink.count(), 0);

        // The first reading is picked up on the next tick
        store.store(17.0);
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(sink.count(), 1);

        lifetime.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_do_not_stop_ticker() {
        let store = Arc::new(LatestValueStore::with_default(4.5));
        let sink = Arc::new(RecordingSink::failing());
        let (lifetime, handle) = spawn_publisher(&store, &sink);

        tokio::time::sleep(Duration::from_secs(25)).await;
        assert_eq!(sink.count(), 2);

        lifetime.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_publisher() {
        let store = Arc::new(LatestValueStore::new());
        let sink = Arc::new(RecordingSink::default());
        let (lifetime, handle) = spawn_publisher(&store, &sink);

        lifetime.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("publisher did not stop")
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_huge_interval_is_clamped() {
        let store = Arc::new(LatestValueStore::with_default(12.0));
        let sink = Arc::new(RecordingSink::default());
        let lifetime = Lifetime::new();
        let handle = tokio::spawn(run_publisher(
            lifetime.clone(),
            store.clone(),
            sink.clone(),
            identity(),
            Duration::from_secs(u64::MAX),
        ));

        tokio::time::sleep(MAX_INTERVAL + Duration::from_secs(1)).await;
        assert_eq!(sink.count(), 1);

        lifetime.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("publisher did not stop")
            .unwrap();
    }

    #[tokio::test]
    async fn test_http_sink_unreachable_endpoint() {
        let sink = HttpSink::new("http://127.0.0.1:1/ingest", "secret", Duration::from_secs(2))
            .unwrap();
        let payload = build_payload(&identity(), 20.0, Utc::now());
        let err = sink.send(&payload).await.unwrap_err();
        assert!(matches!(err, PublishError::Request(_)));
    }
}
