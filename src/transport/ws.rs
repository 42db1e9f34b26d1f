//! WebSocket implementation of the wire

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::SEC_WEBSOCKET_PROTOCOL;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use super::{LinkSignal, TransportError, Wire};
use crate::config::LinkConfig;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Outbound queue capacity. The writer drains fast; this only buffers
/// bursts like a command sent while a payload flush is in flight.
const OUT_CHANNEL_CAPACITY: usize = 64;

/// Inbound queue capacity. The consumer is the router pump, which must see
/// frames strictly in arrival order; a bounded queue keeps a slow consumer
/// from hiding unbounded memory growth.
const IN_CHANNEL_CAPACITY: usize = 256;

enum OutFrame {
    Text(String),
    Binary(Bytes),
}

/// One open WebSocket channel to the device.
///
/// Created by [`WsLink::connect`]; spent once the socket closes. There is
/// no retry or auto-reconnect here: reconnection is a policy for the layer
/// above, which builds a fresh link.
pub struct WsLink {
    out_tx: mpsc::Sender<OutFrame>,
    connected: Arc<AtomicBool>,
}

impl WsLink {
    /// Open the channel, offering the configured subprotocol.
    ///
    /// Returns the link handle plus the inbound signal receiver. Exactly
    /// one consumer drains the receiver; the final signal is always
    /// [`LinkSignal::Closed`].
    pub async fn connect(
        config: &LinkConfig,
    ) -> Result<(Self, mpsc::Receiver<LinkSignal>), TransportError> {
        let mut request = config
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| TransportError::BadEndpoint(e.to_string()))?;
        request.headers_mut().insert(
            SEC_WEBSOCKET_PROTOCOL,
            HeaderValue::from_str(&config.subprotocol)
                .map_err(|e| TransportError::BadEndpoint(e.to_string()))?,
        );

        let (stream, response) = connect_async(request)
            .await
            .map_err(|e| TransportError::Handshake(e.to_string()))?;

        match response.headers().get(SEC_WEBSOCKET_PROTOCOL) {
            Some(agreed) => debug!("subprotocol agreed: {:?}", agreed),
            None => warn!(
                "server did not confirm subprotocol `{}`",
                config.subprotocol
            ),
        }
        info!("device link open: {}", config.url);

        let (sink, source) = stream.split();
        let connected = Arc::new(AtomicBool::new(true));
        let (out_tx, out_rx) = mpsc::channel(OUT_CHANNEL_CAPACITY);
        let (in_tx, in_rx) = mpsc::channel(IN_CHANNEL_CAPACITY);

        tokio::spawn(write_loop(sink, out_rx, Arc::clone(&connected)));
        tokio::spawn(read_loop(source, in_tx, Arc::clone(&connected)));

        Ok((Self { out_tx, connected }, in_rx))
    }

    /// Whether the socket is still up. Sends on a downed link fail with
    /// [`TransportError::NotConnected`] regardless.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn enqueue(&self, frame: OutFrame) -> Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }
        self.out_tx
            .send(frame)
            .await
            .map_err(|_| TransportError::NotConnected)
    }
}

#[async_trait::async_trait]
impl Wire for WsLink {
    async fn send_text(&self, frame: String) -> Result<(), TransportError> {
        self.enqueue(OutFrame::Text(frame)).await
    }

    async fn send_binary(&self, payload: Bytes) -> Result<(), TransportError> {
        self.enqueue(OutFrame::Binary(payload)).await
    }
}

/// Drain the outbound queue into the socket, preserving enqueue order.
async fn write_loop(
    mut sink: SplitSink<WsStream, Message>,
    mut out_rx: mpsc::Receiver<OutFrame>,
    connected: Arc<AtomicBool>,
) {
    while let Some(frame) = out_rx.recv().await {
        let message = match frame {
            OutFrame::Text(text) => Message::Text(text),
            OutFrame::Binary(payload) => Message::Binary(payload.to_vec()),
        };
        if let Err(e) = sink.send(message).await {
            warn!("WebSocket send failed: {}", e);
            break;
        }
    }
    connected.store(false, Ordering::SeqCst);
    let _ = sink.close().await;
}

/// Forward inbound frames in arrival order; terminate with `Closed`.
///
/// Socket errors end the stream with a reason instead of propagating into
/// caller code.
async fn read_loop(
    mut source: SplitStream<WsStream>,
    in_tx: mpsc::Sender<LinkSignal>,
    connected: Arc<AtomicBool>,
) {
    let reason = loop {
        match source.next().await {
            Some(Ok(Message::Text(text))) => {
                if in_tx.send(LinkSignal::Frame(text)).await.is_err() {
                    break "consumer dropped".to_string();
                }
            }
            Some(Ok(Message::Binary(_))) => {
                // The device never sends binary frames; only the client does.
                debug!("ignoring unexpected binary frame from device");
            }
            Some(Ok(Message::Close(frame))) => {
                break match frame {
                    Some(f) if !f.reason.is_empty() => format!("closed by peer: {}", f.reason),
                    _ => "closed by peer".to_string(),
                };
            }
            Some(Ok(_)) => {} // Ping/Pong are answered by tungstenite itself
            Some(Err(e)) => break format!("socket error: {}", e),
            None => break "stream ended".to_string(),
        }
    };

    connected.store(false, Ordering::SeqCst);
    info!("device link down: {}", reason);
    let _ = in_tx.send(LinkSignal::Closed { reason }).await;
}
