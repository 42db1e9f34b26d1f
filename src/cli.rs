//! Command-line session: transcript and outbound commands
//!
//! The transcript is the append-only model behind the UI's console view.
//! It grows monotonically for the lifetime of the connection; capping what
//! gets rendered is the UI's business, not the controller's.

use std::sync::Arc;

use parking_lot::RwLock;
use thiserror::Error;
use tracing::debug;

use crate::protocol::{Outbound, MAX_TEXT_FRAME_BYTES};
use crate::transport::{TransportError, Wire};

/// Why a command was not sent.
#[derive(Debug, Error)]
pub enum CliError {
    /// Empty input crashes the device interpreter; the guard is a
    /// correctness requirement, not cosmetics.
    #[error("refusing to send an empty command")]
    EmptyCommand,

    /// The encoded frame would exceed the device's inbound frame limit
    /// and be discarded unparsed.
    #[error("encoded command frame is {0} bytes, device limit is {MAX_TEXT_FRAME_BYTES}")]
    CommandTooLong(usize),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Interpreter console over the device link.
pub struct CliSession {
    wire: Arc<dyn Wire>,
    transcript: RwLock<Vec<String>>,
}

impl CliSession {
    pub(crate) fn new(wire: Arc<dyn Wire>) -> Self {
        Self {
            wire,
            transcript: RwLock::new(Vec::new()),
        }
    }

    /// Send one command line to the interpreter.
    ///
    /// Validates before any channel write; returns as soon as the frame is
    /// queued. Output arrives asynchronously through the transcript.
    pub async fn send_command(&self, text: &str) -> Result<(), CliError> {
        if text.trim().is_empty() {
            return Err(CliError::EmptyCommand);
        }

        let frame = Outbound::Cli {
            data: text.to_string(),
        }
        .to_frame();
        if frame.len() > MAX_TEXT_FRAME_BYTES {
            return Err(CliError::CommandTooLong(frame.len()));
        }

        self.wire.send_text(frame).await?;
        debug!("sent command ({} bytes)", text.len());
        Ok(())
    }

    /// Append device output to the transcript.
    ///
    /// Splits on newlines, drops empty segments, keeps arrival order.
    /// Returns how many lines survived.
    pub(crate) fn append_remote(&self, text: &str) -> usize {
        let mut transcript = self.transcript.write();
        let before = transcript.len();
        for line in text.split('\n') {
            let line = line.strip_suffix('\r').unwrap_or(line);
            if line.is_empty() {
                continue;
            }
            transcript.push(line.to_string());
        }
        transcript.len() - before
    }

    /// Snapshot of the whole transcript, oldest first.
    pub fn transcript(&self) -> Vec<String> {
        self.transcript.read().clone()
    }

    /// Number of transcript lines so far.
    pub fn line_count(&self) -> usize {
        self.transcript.read().len()
    }
}
