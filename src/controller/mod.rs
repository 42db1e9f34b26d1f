//! Device link: the per-connection controller aggregate
//!
//! One [`DeviceLink`] per connection. It owns the three sessions, feeds
//! every inbound frame through a single ingress ([`DeviceLink::handle_frame`]),
//! and pushes [`LinkEvent`]s to the UI collaborator. When the channel goes
//! down the link is spent: the pending upload is discarded, `Closed` is
//! emitted, and reconnecting means building a fresh link.

mod router;

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::catalog::FileCatalog;
use crate::cli::CliSession;
use crate::config::LinkConfig;
use crate::events::LinkEvent;
use crate::protocol::Outbound;
use crate::transport::{LinkSignal, TransportError, Wire, WsLink};
use crate::upload::UploadSession;

/// Controller for one device connection.
pub struct DeviceLink {
    wire: Arc<dyn Wire>,
    cli: CliSession,
    catalog: FileCatalog,
    upload: UploadSession,
    events: mpsc::UnboundedSender<LinkEvent>,
}

impl DeviceLink {
    /// Assemble a controller over an already-open wire.
    ///
    /// Returns the link and the event stream the UI consumes. Useful for
    /// tests and custom pumps; [`DeviceLink::connect`] is the everyday
    /// entry point.
    pub fn new(
        wire: Arc<dyn Wire>,
        config: &LinkConfig,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<LinkEvent>) {
        let (events, events_rx) = mpsc::unbounded_channel();
        let link = Arc::new(Self {
            cli: CliSession::new(Arc::clone(&wire)),
            catalog: FileCatalog::new(Arc::clone(&wire)),
            upload: UploadSession::new(Arc::clone(&wire), config.max_payload_bytes),
            wire,
            events,
        });
        (link, events_rx)
    }

    /// Open the WebSocket channel and spawn the inbound pump.
    pub async fn connect(
        config: LinkConfig,
    ) -> Result<(Arc<Self>, mpsc::UnboundedReceiver<LinkEvent>), TransportError> {
        let (ws, signals) = WsLink::connect(&config).await?;
        let (link, events_rx) = Self::new(Arc::new(ws), &config);
        tokio::spawn(pump(Arc::clone(&link), signals));
        Ok((link, events_rx))
    }

    /// The interpreter console session.
    pub fn cli(&self) -> &CliSession {
        &self.cli
    }

    /// The cached device file listing.
    pub fn catalog(&self) -> &FileCatalog {
        &self.catalog
    }

    /// The upload coordinator.
    pub fn uploads(&self) -> &UploadSession {
        &self.upload
    }

    /// Kill the running device program, optionally restarting the
    /// interpreter task. Fire-and-forget; no response is defined.
    pub async fn kill_program(&self, restart_task: bool) -> Result<(), TransportError> {
        self.wire
            .send_text(
                Outbound::Kill {
                    restart_task: restart_task.into(),
                }
                .to_frame(),
            )
            .await
    }

    /// Feed one inbound signal through the controller.
    ///
    /// This is the single ingress the pump drives; callers running their
    /// own receive loop call it directly, in arrival order.
    pub async fn handle_signal(&self, signal: LinkSignal) {
        match signal {
            LinkSignal::Frame(raw) => self.handle_frame(&raw).await,
            LinkSignal::Closed { reason } => self.on_link_closed(reason).await,
        }
    }

    /// Decode and dispatch one inbound text frame.
    ///
    /// Malformed and unknown frames are logged and dropped; they never
    /// fail the caller or desynchronize session state.
    pub async fn handle_frame(&self, raw: &str) {
        router::dispatch(self, raw).await;
    }

    async fn on_link_closed(&self, reason: String) {
        self.upload.clear_on_close().await;
        info!("device link closed: {}", reason);
        self.emit(LinkEvent::Closed { reason });
    }

    fn emit(&self, event: LinkEvent) {
        // A dropped receiver means the UI is gone; nothing left to notify.
        if self.events.send(event).is_err() {
            debug!("event receiver dropped");
        }
    }
}

/// Drive the controller from the transport's signal stream until closure.
async fn pump(link: Arc<DeviceLink>, mut signals: mpsc::Receiver<LinkSignal>) {
    while let Some(signal) = signals.recv().await {
        let done = matches!(signal, LinkSignal::Closed { .. });
        link.handle_signal(signal).await;
        if done {
            break;
        }
    }
}
