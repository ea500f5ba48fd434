// src/io/types.rs
//
// Transmit plumbing shared by the session manager and receive loops.
// The receive thread is the only owner of a transport, so outbound frames
// are queued to it and the result comes back on a one-shot reply.

use std::sync::mpsc as std_mpsc;
use tokio::sync::oneshot;

use super::{CanTransmitFrame, IoError};

/// Transmit request sent through the channel
#[derive(Debug)]
pub struct TransmitRequest {
    pub frame: CanTransmitFrame,
    /// Reply channel for the transmit result
    pub result_tx: oneshot::Sender<Result<(), IoError>>,
}

/// Sender type for transmit requests (sync-safe, bounded)
pub type TransmitSender = std_mpsc::SyncSender<TransmitRequest>;
