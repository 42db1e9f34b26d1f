//! Transport layer: ownership of the duplex channel
//!
//! [`Wire`] is the seam between the sessions and the socket: everything
//! above it sends through `send_text`/`send_binary` and nothing else ever
//! touches the channel. [`WsLink`] is the production implementation;
//! [`testing::RecordingWire`] is the in-memory double the test suites run
//! against.

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

mod ws;
pub mod testing;

pub use ws::WsLink;

/// Transport failure surfaced to callers.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("channel is not open")]
    NotConnected,

    #[error("invalid endpoint: {0}")]
    BadEndpoint(String),

    #[error("WebSocket handshake failed: {0}")]
    Handshake(String),
}

/// One inbound signal from the channel, delivered in strict arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum LinkSignal {
    /// A structured text frame, undecoded.
    Frame(String),
    /// The channel is gone; no further signals follow.
    Closed { reason: String },
}

/// Send half of the duplex channel.
///
/// Implementations queue frames and preserve enqueue order; both methods
/// return [`TransportError::NotConnected`] once the channel is down and
/// never panic on channel loss.
#[async_trait]
pub trait Wire: Send + Sync {
    /// Transmit one structured text frame.
    async fn send_text(&self, frame: String) -> Result<(), TransportError>;

    /// Transmit one raw binary frame (upload payload flush).
    async fn send_binary(&self, payload: Bytes) -> Result<(), TransportError>;
}
