//! In-memory wire double for the test suites
//!
//! Records every frame instead of touching a socket, so tests can assert
//! on exact channel traffic (and on its absence).

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;

use super::{TransportError, Wire};

/// One recorded send.
#[derive(Debug, Clone, PartialEq)]
pub enum SentFrame {
    Text(String),
    Binary(Bytes),
}

/// A wire that records instead of transmitting.
#[derive(Default)]
pub struct RecordingWire {
    sent: Mutex<Vec<SentFrame>>,
    down: AtomicBool,
}

impl RecordingWire {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything sent so far, in order.
    pub fn sent(&self) -> Vec<SentFrame> {
        self.sent.lock().clone()
    }

    /// Text frames only, in order.
    pub fn texts(&self) -> Vec<String> {
        self.sent
            .lock()
            .iter()
            .filter_map(|f| match f {
                SentFrame::Text(t) => Some(t.clone()),
                SentFrame::Binary(_) => None,
            })
            .collect()
    }

    /// Binary frames only, in order.
    pub fn binaries(&self) -> Vec<Bytes> {
        self.sent
            .lock()
            .iter()
            .filter_map(|f| match f {
                SentFrame::Binary(b) => Some(b.clone()),
                SentFrame::Text(_) => None,
            })
            .collect()
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().len()
    }

    pub fn clear(&self) {
        self.sent.lock().clear();
    }

    /// Make all subsequent sends fail with `NotConnected`.
    pub fn disconnect(&self) {
        self.down.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl Wire for RecordingWire {
    async fn send_text(&self, frame: String) -> Result<(), TransportError> {
        if self.down.load(Ordering::SeqCst) {
            return Err(TransportError::NotConnected);
        }
        self.sent.lock().push(SentFrame::Text(frame));
        Ok(())
    }

    async fn send_binary(&self, payload: Bytes) -> Result<(), TransportError> {
        if self.down.load(Ordering::SeqCst) {
            return Err(TransportError::NotConnected);
        }
        self.sent.lock().push(SentFrame::Binary(payload));
        Ok(())
    }
}
