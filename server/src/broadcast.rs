use std::sync::Arc;

use system::{ServerMessage, SessionId};
use tokio::sync::mpsc::error::TrySendError;

use crate::connection::ConnectionEvent;

pub type ConnectionTx = tokio::sync::mpsc::Sender<ConnectionEvent>;

/// Frames queued per session before the session counts as unresponsive.
pub const OUTBOUND_BUFFER: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DeliveryError {
    #[error("outbound queue is full")]
    Full,
    #[error("connection is closed")]
    Closed,
}

/// A session's outbound handle, captured so fan-out can run after the
/// registry lock is released.
#[derive(Debug, Clone)]
pub struct Target {
    pub session_id: SessionId,
    pub tx: ConnectionTx,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct Fanout {
    pub delivered: usize,
    /// Sessions whose queue was full. They are flagged for eviction.
    pub failed: Vec<SessionId>,
}

pub fn encode(message: &ServerMessage) -> Option<Arc<str>> {
    match message.to_json() {
        Ok(json) => Some(Arc::from(json)),
        Err(err) => {
            log::error!("Failed to serialize {:?}: {}", message, err);
            None
        }
    }
}

/// Enqueues a frame without waiting. A slow client fills its own queue and
/// never holds up anyone else.
pub fn send_frame(tx: &ConnectionTx, frame: Arc<str>) -> Result<(), DeliveryError> {
    tx.try_send(ConnectionEvent::Frame(frame))
        .map_err(|err| match err {
            TrySendError::Full(_) => DeliveryError::Full,
            TrySendError::Closed(_) => DeliveryError::Closed,
        })
}

pub fn send_to(tx: &ConnectionTx, message: &ServerMessage) -> Result<(), DeliveryError> {
    match encode(message) {
        Some(frame) => send_frame(tx, frame),
        None => Ok(()),
    }
}

/// Serializes `message` once and queues it for every target except `exclude`.
/// Closed connections are skipped silently; the liveness monitor cleans them up.
pub fn publish(targets: &[Target], message: &ServerMessage, exclude: Option<&SessionId>) -> Fanout {
    let mut fanout = Fanout::default();
    let frame = match encode(message) {
        Some(frame) => frame,
        None => return fanout,
    };

    for target in targets {
        if exclude == Some(&target.session_id) {
            continue;
        }
        match send_frame(&target.tx, frame.clone()) {
            Ok(()) => fanout.delivered += 1,
            Err(DeliveryError::Closed) => {
                log::debug!("Skipping closed session {}", target.session_id);
            }
            Err(DeliveryError::Full) => {
                log::warn!("Outbound queue of session {} is full", target.session_id);
                fanout.failed.push(target.session_id);
            }
        }
    }

    fanout
}
