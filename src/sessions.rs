// src/sessions.rs
//
// Bus session lifecycle: start, stop and transmit on the single active
// acquisition session.
//
// A session owns exactly one open transport. The transport lives on a
// blocking receive thread that polls the session lifetime between reads;
// callers reach it only through the transmit queue. Teardown always runs
// in the same order: cancel the lifetime, close the transport, release the
// slot.

use futures::future::{BoxFuture, FutureExt, Shared};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc as std_mpsc;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::oneshot;

use crate::io::serial::{decode_line, LineFramer};
use crate::io::socketcan::decode_frame;
use crate::io::{
    BusFrame, BusTransport, BusUnit, CanTransmitFrame, Connector, DecodeError, IoError, TransmitRequest,
    TransmitSender, TransportKind,
};
use crate::lifetime::Lifetime;
use crate::store::LatestValueStore;

/// How long `send_frame` waits for the receive thread to report a result
pub const TRANSMIT_TIMEOUT: Duration = Duration::from_secs(1);
/// Largest classic CAN payload
pub const MAX_CAN_PAYLOAD: usize = 8;
const MAX_STANDARD_ID: u32 = 0x7FF;
const MAX_EXTENDED_ID: u32 = 0x1FFF_FFFF;
/// Pending transmit requests per session
const TRANSMIT_QUEUE_DEPTH: usize = 32;

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Error)]
pub enum BusError {
    #[error("a bus session is already active")]
    AlreadyActive,
    #[error("no bus session is active")]
    NotActive,
    #[error("failed to open transport: {0}")]
    Connect(IoError),
    #[error("payload too large: {0} bytes (max 8)")]
    PayloadTooLarge(usize),
    #[error("invalid frame ID: 0x{0:X}")]
    InvalidFrameId(u32),
    #[error("the active session does not support transmit")]
    TransmitUnsupported,
    #[error("transmit did not complete within 1 s")]
    TransmitTimeout,
    #[error("transmit failed: {0}")]
    Transmit(IoError),
}

/// Externally visible session state
#[derive(Clone, Debug, PartialEq)]
pub enum SessionStatus {
    Idle,
    /// `start` is still opening the transport
    Opening { interface: String },
    Active {
        interface: String,
        kind: TransportKind,
        started_at: chrono::DateTime<chrono::Utc>,
    },
}

impl SessionStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, SessionStatus::Active { .. })
    }
}

/// Cumulative receive counters across all sessions of one manager
#[derive(Debug, Default)]
struct SessionStats {
    units_read: AtomicU64,
    readings_stored: AtomicU64,
    decode_failures: AtomicU64,
    frames_filtered: AtomicU64,
    error_frames: AtomicU64,
}

impl SessionStats {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SessionStatsSnapshot {
    pub units_read: u64,
    pub readings_stored: u64,
    pub decode_failures: u64,
    pub frames_filtered: u64,
    pub error_frames: u64,
}

struct ActiveSession {
    id: u64,
    interface: String,
    kind: TransportKind,
    started_at: chrono::DateTime<chrono::Utc>,
    lifetime: Lifetime,
    transmit_tx: TransmitSender,
    /// Resolves once the receive thread has exited and released the slot
    done: Shared<BoxFuture<'static, ()>>,
}

enum SessionSlot {
    Idle,
    Opening { interface: String },
    Active(ActiveSession),
}

type SlotRef = Arc<Mutex<SessionSlot>>;

fn lock_slot(slot: &SlotRef) -> MutexGuard<'_, SessionSlot> {
    slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Return the slot to Idle if it still belongs to session `id`.
fn release_slot(slot: &SlotRef, id: u64) {
    let mut guard = lock_slot(slot);
    if matches!(&*guard, SessionSlot::Active(s) if s.id == id) {
        *guard = SessionSlot::Idle;
    }
}

/// Resets an Opening slot if `start` is abandoned before it finishes.
struct OpeningGuard<'a> {
    slot: &'a SlotRef,
    armed: bool,
}

impl Drop for OpeningGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            let mut guard = lock_slot(self.slot);
            if matches!(&*guard, SessionSlot::Opening { .. }) {
                *guard = SessionSlot::Idle;
            }
        }
    }
}

// ============================================================================
// Session Manager
// ============================================================================

/// Owns the single acquisition session slot.
pub struct SessionManager {
    connector: Arc<dyn Connector>,
    store: Arc<LatestValueStore>,
    /// CAN arbitration ID carrying temperature readings
    channel_id: u32,
    slot: SlotRef,
    stats: Arc<SessionStats>,
    next_id: AtomicU64,
}

impl SessionManager {
    pub fn new(connector: Arc<dyn Connector>, store: Arc<LatestValueStore>, channel_id: u32) -> Self {
        Self {
            connector,
            store,
            channel_id,
            slot: Arc::new(Mutex::new(SessionSlot::Idle)),
            stats: Arc::new(SessionStats::default()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Open `interface` and start a receive loop under a child of `parent`.
    ///
    /// Returns once the transport is open; reading continues in the
    /// background until `stop`, a transport error, or `parent` is cancelled.
    pub async fn start(&self, parent: &Lifetime, interface: &str) -> Result<(), BusError> {
        {
            let mut slot = lock_slot(&self.slot);
            if !matches!(*slot, SessionSlot::Idle) {
                return Err(BusError::AlreadyActive);
            }
            *slot = SessionSlot::Opening {
                interface: interface.to_string(),
            };
        }
        let mut opening = OpeningGuard {
            slot: &self.slot,
            armed: true,
        };

        let connector = self.connector.clone();
        let iface = interface.to_string();
        let transport = match tokio::task::spawn_blocking(move || connector.open(&iface)).await {
            Ok(Ok(transport)) => transport,
            Ok(Err(e)) => {
                tlog!("session", "Failed to open {}: {}", interface, e);
                return Err(BusError::Connect(e));
            }
            Err(e) => {
                let device = format!("{}({})", self.connector.kind(), interface);
                tlog!("session", "Open task for {} failed: {}", device, e);
                return Err(BusError::Connect(IoError::connection(&device, e.to_string())));
            }
        };

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let kind = transport.kind();
        let device = transport.device().to_string();
        let lifetime = parent.child();
        let (transmit_tx, transmit_rx) = std_mpsc::sync_channel(TRANSMIT_QUEUE_DEPTH);

        let receiver = ReceiveLoop {
            id,
            transport,
            transmit_rx,
            lifetime: lifetime.clone(),
            store: self.store.clone(),
            stats: self.stats.clone(),
            channel_id: self.channel_id,
            slot: self.slot.clone(),
        };

        // Spawned under the slot lock so a loop that ends immediately can't
        // release the slot before it is marked Active.
        let mut slot = lock_slot(&self.slot);
        let supervisor = {
            let slot = self.slot.clone();
            let lifetime = lifetime.clone();
            tokio::spawn(async move {
                if let Err(e) = tokio::task::spawn_blocking(move || receiver.run()).await {
                    tlog!("session", "Receive loop for {} aborted: {}", device, e);
                    lifetime.cancel();
                    release_slot(&slot, id);
                }
            })
        };
        let done = async move {
            let _ = supervisor.await;
        }
        .boxed()
        .shared();

        *slot = SessionSlot::Active(ActiveSession {
            id,
            interface: interface.to_string(),
            kind,
            started_at: chrono::Utc::now(),
            lifetime,
            transmit_tx,
            done,
        });
        drop(slot);
        opening.armed = false;

        tlog!("session", "Started {} session {} on {}", kind, id, interface);
        Ok(())
    }

    /// Stop the active session and wait for its receive loop to exit.
    /// Succeeds immediately when nothing is active or a start is still opening.
    pub async fn stop(&self) -> Result<(), BusError> {
        let (id, lifetime, done) = match &*lock_slot(&self.slot) {
            SessionSlot::Active(s) => (s.id, s.lifetime.clone(), s.done.clone()),
            _ => return Ok(()),
        };

        tlog!("session", "Stopping session {}", id);
        lifetime.cancel();
        done.await;
        Ok(())
    }

    /// Queue a CAN frame for transmission on the active session.
    pub async fn send_frame(
        &self,
        frame_id: u32,
        payload: &[u8],
        extended: bool,
    ) -> Result<(), BusError> {
        let (kind, transmit_tx) = match &*lock_slot(&self.slot) {
            SessionSlot::Active(s) => (s.kind, s.transmit_tx.clone()),
            _ => return Err(BusError::NotActive),
        };

        if kind != TransportKind::SocketCan {
            return Err(BusError::TransmitUnsupported);
        }
        if payload.len() > MAX_CAN_PAYLOAD {
            return Err(BusError::PayloadTooLarge(payload.len()));
        }
        let max_id = if extended { MAX_EXTENDED_ID } else { MAX_STANDARD_ID };
        if frame_id > max_id {
            return Err(BusError::InvalidFrameId(frame_id));
        }

        let (result_tx, result_rx) = oneshot::channel();
        let request = TransmitRequest {
            frame: CanTransmitFrame {
                frame_id,
                data: payload.to_vec(),
                is_extended: extended,
            },
            result_tx,
        };
        match transmit_tx.try_send(request) {
            Ok(()) => {}
            Err(std_mpsc::TrySendError::Full(_)) => return Err(BusError::TransmitTimeout),
            Err(std_mpsc::TrySendError::Disconnected(_)) => return Err(BusError::NotActive),
        }

        match tokio::time::timeout(TRANSMIT_TIMEOUT, result_rx).await {
            Ok(Ok(Ok(()))) => Ok(()),
            Ok(Ok(Err(e))) => Err(BusError::Transmit(e)),
            // Loop ended without answering
            Ok(Err(_)) => Err(BusError::NotActive),
            Err(_) => Err(BusError::TransmitTimeout),
        }
    }

    pub fn status(&self) -> SessionStatus {
        match &*lock_slot(&self.slot) {
            SessionSlot::Idle => SessionStatus::Idle,
            SessionSlot::Opening { interface } => SessionStatus::Opening {
                interface: interface.clone(),
            },
            SessionSlot::Active(s) => SessionStatus::Active {
                interface: s.interface.clone(),
                kind: s.kind,
                started_at: s.started_at,
            },
        }
    }

    pub fn stats(&self) -> SessionStatsSnapshot {
        let s = &self.stats;
        SessionStatsSnapshot {
            units_read: s.units_read.load(Ordering::Relaxed),
            readings_stored: s.readings_stored.load(Ordering::Relaxed),
            decode_failures: s.decode_failures.load(Ordering::Relaxed),
            frames_filtered: s.frames_filtered.load(Ordering::Relaxed),
            error_frames: s.error_frames.load(Ordering::Relaxed),
        }
    }
}

// ============================================================================
// Receive Loop
// ============================================================================

/// Everything the blocking receive thread owns for one session
struct ReceiveLoop {
    id: u64,
    transport: Box<dyn BusTransport>,
    transmit_rx: std_mpsc::Receiver<TransmitRequest>,
    lifetime: Lifetime,
    store: Arc<LatestValueStore>,
    stats: Arc<SessionStats>,
    channel_id: u32,
    slot: SlotRef,
}

impl ReceiveLoop {
    fn run(mut self) {
        let device = self.transport.device().to_string();
        let mut framer = LineFramer::new();
        let mut end_reason = String::from("stopped");

        while !self.lifetime.is_cancelled() {
            // Transmit requests are serviced between reads
            while let Ok(req) = self.transmit_rx.try_recv() {
                let result = self.transport.transmit(&req.frame);
                if let Err(ref e) = result {
                    tlog!("session", "Transmit on {} failed: {}", device, e);
                }
                let _ = req.result_tx.send(result);
            }

            match self.transport.read_unit() {
                Ok(Some(BusUnit::Bytes(bytes))) => {
                    SessionStats::bump(&self.stats.units_read);
                    for line in framer.feed(&bytes) {
                        self.apply(decode_line(&line), &device, &line);
                    }
                }
                Ok(Some(BusUnit::Frame(frame))) => {
                    SessionStats::bump(&self.stats.units_read);
                    if !on_channel(&frame, self.channel_id) {
                        SessionStats::bump(&self.stats.frames_filtered);
                        continue;
                    }
                    let label = format!(
                        "0x{:X} [{}] @{}us",
                        frame.frame_id,
                        hex::encode(frame.payload()),
                        frame.timestamp_us
                    );
                    self.apply(decode_frame(&frame), &device, &label);
                }
                Ok(Some(BusUnit::ErrorFrame(description))) => {
                    SessionStats::bump(&self.stats.units_read);
                    SessionStats::bump(&self.stats.error_frames);
                    tlog!("session", "Error frame on {}: {}", device, description);
                }
                Ok(None) => {}
                Err(e) => {
                    tlog!("session", "Read error on {}: {}", device, e);
                    end_reason = e.to_string();
                    break;
                }
            }
        }

        self.lifetime.cancel();
        self.transport.close();
        while let Ok(req) = self.transmit_rx.try_recv() {
            let _ = req.result_tx.send(Err(IoError::disconnected(&device)));
        }
        release_slot(&self.slot, self.id);

        tlog!("session", "Session {} on {} ended ({})", self.id, device, end_reason);
    }

    fn apply(&self, decoded: Result<f64, DecodeError>, device: &str, input: &str) {
        match decoded {
            Ok(value) => {
                self.store.store(value);
                SessionStats::bump(&self.stats.readings_stored);
            }
            Err(e) => {
                SessionStats::bump(&self.stats.decode_failures);
                tlog!("session", "Dropped {:?} from {}: {}", input, device, e);
            }
        }
    }
}

/// IDs up to 0x7FF name a standard (11-bit) frame, anything above an
/// extended (29-bit) one. 0x100 standard and 0x100 extended are different
/// channels on the wire.
fn on_channel(frame: &BusFrame, channel_id: u32) -> bool {
    frame.frame_id == channel_id && frame.is_extended == (channel_id > 0x7FF)
}
