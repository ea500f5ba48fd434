// src/io/mock.rs
//
// Scripted in-memory transport for session tests.
// A test pushes steps onto a shared feed; the receive loop pops one step per
// read and sees a read timeout once the feed is empty.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use super::{BusFrame, BusTransport, BusUnit, CanTransmitFrame, Connector, IoError, TransportKind};

pub(crate) enum Step {
    Unit(BusUnit),
    Fail(IoError),
    Panic,
}

#[derive(Default)]
struct MockState {
    feed: VecDeque<Step>,
    open_error: Option<IoError>,
    opened: Vec<String>,
    closed: usize,
    transmitted: Vec<CanTransmitFrame>,
    transmit_delay: Option<Duration>,
}

/// Handle shared between a test and the connector it hands to a session manager
#[derive(Clone, Default)]
pub(crate) struct MockBus {
    state: Arc<Mutex<MockState>>,
}

impl MockBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn connector(&self, kind: TransportKind) -> Arc<dyn Connector> {
        Arc::new(MockConnector {
            kind,
            bus: self.clone(),
        })
    }

    pub fn push_bytes(&self, bytes: &[u8]) {
        self.lock().feed.push_back(Step::Unit(BusUnit::Bytes(bytes.to_vec())));
    }

    pub fn push_frame(&self, frame_id: u32, data: &[u8]) {
        self.lock().feed.push_back(Step::Unit(BusUnit::Frame(BusFrame {
            frame_id,
            dlc: data.len() as u8,
            bytes: data.to_vec(),
            is_extended: frame_id > 0x7FF,
            timestamp_us: super::now_us(),
        })));
    }

    pub fn push(&self, step: Step) {
        self.lock().feed.push_back(step);
    }

    pub fn fail_open(&self, err: IoError) {
        self.lock().open_error = Some(err);
    }

    pub fn set_transmit_delay(&self, delay: Duration) {
        self.lock().transmit_delay = Some(delay);
    }

    pub fn opened(&self) -> Vec<String> {
        self.lock().opened.clone()
    }

    pub fn closed(&self) -> usize {
        self.lock().closed
    }

    pub fn transmitted(&self) -> Vec<CanTransmitFrame> {
        self.lock().transmitted.clone()
    }
}

struct MockConnector {
    kind: TransportKind,
    bus: MockBus,
}

impl Connector for MockConnector {
    fn kind(&self) -> TransportKind {
        self.kind
    }

    fn open(&self, interface: &str) -> Result<Box<dyn BusTransport>, IoError> {
        let mut state = self.bus.lock();
        if let Some(err) = state.open_error.clone() {
            return Err(err);
        }
        state.opened.push(interface.to_string());
        Ok(Box::new(MockTransport {
            kind: self.kind,
            device: format!("mock({})", interface),
            bus: self.bus.clone(),
            open: true,
        }))
    }
}

struct MockTransport {
    kind: TransportKind,
    device: String,
    bus: MockBus,
    open: bool,
}

impl BusTransport for MockTransport {
    fn kind(&self) -> TransportKind {
        self.kind
    }

    fn device(&self) -> &str {
        &self.device
    }

    fn read_unit(&mut self) -> Result<Option<BusUnit>, IoError> {
        if !self.open {
            return Err(IoError::read(&self.device, "closed"));
        }
        let step = self.bus.lock().feed.pop_front();
        match step {
            Some(Step::Unit(unit)) => Ok(Some(unit)),
            Some(Step::Fail(err)) => Err(err),
            Some(Step::Panic) => panic!("scripted receive panic"),
            None => {
                // Stand-in for a port read timeout
                std::thread::sleep(Duration::from_millis(2));
                Ok(None)
            }
        }
    }

    fn transmit(&mut self, frame: &CanTransmitFrame) -> Result<(), IoError> {
        if self.kind == TransportKind::Serial {
            return Err(IoError::unsupported(&self.device, "transmit is not supported"));
        }
        let delay = self.bus.lock().transmit_delay;
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }
        self.bus.lock().transmitted.push(frame.clone());
        Ok(())
    }

    fn close(&mut self) {
        if self.open {
            self.open = false;
            self.bus.lock().closed += 1;
        }
    }
}
