//! Fan-out of events and binary frames to every control client.

use crate::control::frame::{AUDIO_FRAME, Frame, SPECTRUM_FRAME};
use crate::control::protocol::Event;
use crate::error::{Result, SdrError};
use crate::defaults::EVENT_QUEUE_DEPTH;
use crate::scanner::ScanStatus;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::broadcast;

/// One outbound message.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Event(Event),
    Frame(Frame),
}

impl Outbound {
    /// Message payload: JSON text for events, the binary layout for frames.
    ///
    /// # Errors
    /// `SdrError::Protocol` if an event fails to serialize.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        match self {
            Outbound::Event(event) => event
                .to_json()
                .map(String::into_bytes)
                .map_err(|e| SdrError::Protocol {
                    message: format!("failed to serialize event: {e}"),
                }),
            Outbound::Frame(frame) => Ok(frame.encode()),
        }
    }

    /// Inverse of [`Outbound::to_bytes`]; frames are told apart by their
    /// leading type byte, which JSON text never starts with.
    ///
    /// # Errors
    /// `SdrError::Protocol` for anything that is neither.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        match bytes.first() {
            Some(&SPECTRUM_FRAME) | Some(&AUDIO_FRAME) => Frame::decode(bytes).map(Outbound::Frame),
            _ => {
                let text = std::str::from_utf8(bytes).map_err(|e| SdrError::Protocol {
                    message: format!("event is not UTF-8: {e}"),
                })?;
                Event::from_json(text)
                    .map(Outbound::Event)
                    .map_err(|e| SdrError::Protocol {
                        message: format!("failed to parse event: {e}"),
                    })
            }
        }
    }
}

/// Publishing never blocks: a client that falls more than the channel depth
/// behind loses messages on its own side.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<Outbound>,
    last_scan: Arc<Mutex<Option<ScanStatus>>>,
}

impl EventBus {
    pub fn new(depth: usize) -> Self {
        let (tx, _) = broadcast::channel(depth.max(1));
        Self {
            tx,
            last_scan: Arc::new(Mutex::new(None)),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Outbound> {
        self.tx.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn publish(&self, event: Event) {
        if let Event::ScanStatus(status) = &event {
            *self.last_scan.lock().unwrap_or_else(PoisonError::into_inner) = Some(status.clone());
        }
        // No subscribers is not an error.
        let _ = self.tx.send(Outbound::Event(event));
    }

    pub fn publish_frame(&self, frame: Frame) {
        if self.tx.receiver_count() > 0 {
            let _ = self.tx.send(Outbound::Frame(frame));
        }
    }

    /// Most recent `SCAN_STATUS`, replayed to newly connected clients.
    pub fn last_scan_status(&self) -> Option<ScanStatus> {
        self.last_scan
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(EVENT_QUEUE_DEPTH)
    }
}
