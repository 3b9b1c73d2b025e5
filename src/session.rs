//! Persistent JSON-over-WebSocket session to one device.
//!
//! The session owns its reconnection loop: resolve address, connect with a
//! bounded handshake timeout, stream frames until the connection drops, wait
//! a fixed delay, repeat. Callers only ever observe connection-status events
//! and inbound documents; a failed or slow connection never surfaces through
//! `send`, which fails fast with [`Error::NotConnected`] instead of queueing.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::sync::{broadcast, mpsc};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::logger::{MessageLogMode, MessageLogger};
use crate::{Error, Result};

const EVENT_CHANNEL_CAPACITY: usize = 64;
const OUTBOUND_CHANNEL_CAPACITY: usize = 16;

/// Produces the WebSocket address immediately before each connect attempt.
/// Discovery hands the session a resolver rather than a fixed address so a
/// device that changes IP between reconnects is still found.
pub type AddressSource = Arc<dyn Fn() -> BoxFuture<'static, Result<String>> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Connected,
    Disconnected,
}

#[derive(Debug, Clone)]
pub enum SessionEvent {
    Status(ConnectionStatus),
    /// A full state document received from the device, in receipt order.
    Document(Value),
}

pub struct DeviceSessionBuilder {
    name: String,
    source: AddressSource,
    handshake_timeout: Duration,
    reconnect_delay: Duration,
    log: Option<(MessageLogMode, String)>,
}

impl DeviceSessionBuilder {
    pub fn new(name: impl Into<String>, source: AddressSource) -> Self {
        Self {
            name: name.into(),
            source,
            handshake_timeout: Duration::from_secs(4),
            reconnect_delay: Duration::from_secs(5),
            log: None,
        }
    }

    /// Convenience constructor for a session with a fixed, pre-resolved
    /// address (static device configs and tests).
    pub fn fixed(name: impl Into<String>, address: impl Into<String>) -> Self {
        let address = address.into();
        Self::new(
            name,
            Arc::new(move || {
                let address = address.clone();
                Box::pin(async move { Ok(address) })
            }),
        )
    }

    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    pub fn reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    pub fn message_log(mut self, mode: MessageLogMode, path: impl Into<String>) -> Self {
        self.log = Some((mode, path.into()));
        self
    }

    /// Spawn the session's background connection loop and return its handle.
    pub fn spawn(self) -> DeviceSession {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_CHANNEL_CAPACITY);
        let connected = Arc::new(AtomicBool::new(false));
        let cancel = CancellationToken::new();

        let logger = self.log.and_then(|(mode, path)| {
            MessageLogger::new(mode, &path)
                .inspect_err(|e| warn!(path = %path, "failed to open message log: {e}"))
                .ok()
        });

        let task = SessionTask {
            name: self.name.clone(),
            source: self.source,
            handshake_timeout: self.handshake_timeout,
            reconnect_delay: self.reconnect_delay,
            events: event_tx.clone(),
            connected: connected.clone(),
            cancel: cancel.clone(),
            logger,
        };
        tokio::spawn(task.run(outbound_rx));

        DeviceSession {
            name: self.name,
            connected,
            outbound: outbound_tx,
            events: event_tx,
            cancel,
        }
    }
}

/// Handle to a running device session. Dropping the handle tears the
/// connection loop down.
pub struct DeviceSession {
    name: String,
    connected: Arc<AtomicBool>,
    outbound: mpsc::Sender<Value>,
    events: broadcast::Sender<SessionEvent>,
    cancel: CancellationToken,
}

impl DeviceSession {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Queue a partial command fragment for delivery on the live connection.
    ///
    /// Fails immediately with [`Error::NotConnected`] while disconnected;
    /// commands are never held back for a future reconnect.
    pub async fn send(&self, fragment: Value) -> Result<()> {
        if !self.is_connected() {
            warn!(device = %self.name, "device not connected, dropping command");
            return Err(Error::NotConnected);
        }
        self.outbound
            .send(fragment)
            .await
            .map_err(|_| Error::Closed)
    }

    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Token cancelled when the session shuts down. Companion tasks tie
    /// their lifetime to it instead of polling a liveness flag.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

impl Drop for DeviceSession {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

struct SessionTask {
    name: String,
    source: AddressSource,
    handshake_timeout: Duration,
    reconnect_delay: Duration,
    events: broadcast::Sender<SessionEvent>,
    connected: Arc<AtomicBool>,
    cancel: CancellationToken,
    logger: Option<MessageLogger>,
}

impl SessionTask {
    async fn run(mut self, mut outbound: mpsc::Receiver<Value>) {
        loop {
            if self.cancel.is_cancelled() {
                break;
            }

            let address = match (self.source)().await {
                Ok(address) => address,
                Err(e) => {
                    warn!(device = %self.name, "address resolution failed: {e}");
                    if !self.sleep_before_retry().await {
                        break;
                    }
                    continue;
                }
            };

            debug!(device = %self.name, address = %address, "connecting");
            let stream = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                result = timeout(self.handshake_timeout, connect_async(&address)) => result,
            };

            match stream {
                Ok(Ok((ws, _response))) => {
                    // Fragments stranded by the previous connection are stale
                    // intent. Drain them before announcing connectivity: once
                    // the flag flips, anything `send` accepts must reach the
                    // socket.
                    while outbound.try_recv().is_ok() {}

                    self.set_status(ConnectionStatus::Connected);
                    info!(device = %self.name, address = %address, "device connected");

                    self.drive(ws, &mut outbound).await;

                    self.set_status(ConnectionStatus::Disconnected);
                    info!(device = %self.name, "device disconnected");
                }
                Ok(Err(e)) => {
                    warn!(device = %self.name, "connect failed: {e}");
                }
                Err(_elapsed) => {
                    warn!(device = %self.name, "handshake timed out");
                }
            }

            if !self.sleep_before_retry().await {
                break;
            }
        }

        self.connected.store(false, Ordering::SeqCst);
        debug!(device = %self.name, "session loop exiting");
    }

    /// Stream frames and outbound commands until the connection drops or the
    /// session is cancelled.
    async fn drive(
        &mut self,
        ws: WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>,
        outbound: &mut mpsc::Receiver<Value>,
    ) {
        let (mut sink, mut stream) = ws.split();

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    let _ = sink.close().await;
                    return;
                }
                fragment = outbound.recv() => {
                    let Some(fragment) = fragment else { return };
                    if let Some(ref mut logger) = self.logger {
                        logger.log_outbound(&self.name, &fragment);
                    }
                    if let Err(e) = sink.send(Message::Text(fragment.to_string().into())).await {
                        warn!(device = %self.name, "send failed: {e}");
                        return;
                    }
                }
                frame = stream.next() => {
                    match frame {
                        Some(Ok(Message::Text(text))) => self.handle_document(&text),
                        Some(Ok(Message::Close(_))) => {
                            debug!(device = %self.name, "close frame received");
                            return;
                        }
                        Some(Ok(_)) => {} // ping/pong/binary
                        Some(Err(e)) => {
                            warn!(device = %self.name, "socket error: {e}");
                            return;
                        }
                        None => return,
                    }
                }
            }
        }
    }

    fn handle_document(&mut self, text: &str) {
        let document: Value = match serde_json::from_str(text) {
            Ok(v) => v,
            Err(e) => {
                warn!(device = %self.name, "malformed inbound document: {e}");
                return;
            }
        };
        if let Some(ref mut logger) = self.logger {
            logger.log_inbound(&self.name, &document);
        }
        let _ = self.events.send(SessionEvent::Document(document));
    }

    fn set_status(&mut self, status: ConnectionStatus) {
        let connected = status == ConnectionStatus::Connected;
        self.connected.store(connected, Ordering::SeqCst);
        if let Some(ref mut logger) = self.logger {
            logger.log_status(&self.name, connected);
        }
        let _ = self.events.send(SessionEvent::Status(status));
    }

    /// Returns false when cancellation arrived during the delay.
    async fn sleep_before_retry(&self) -> bool {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => false,
            _ = tokio::time::sleep(self.reconnect_delay) => true,
        }
    }
}
