//! WebSocket connection and event loop.
//!
//! This module owns the persistent connection to the remote debugging
//! endpoint, including request/response correlation and event routing.
//!
//! # Event Loop
//!
//! The connection spawns a tokio task that handles:
//!
//! - Incoming messages from the browser (responses, events)
//! - Outgoing commands from the observer
//! - Request/response correlation by monotonically increasing id
//! - Forwarding events to the single registered event sink
//!
//! Exactly one dispatch loop runs per connection lifetime. All
//! connection-side mutable state (correlation map, socket halves) is
//! touched only from that loop. There is no reconnection: a dropped
//! connection ends the observation session.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::{Value, to_string};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, trace, warn};

use crate::error::{Error, Result};
use crate::identifiers::{RequestId, SessionId};
use crate::protocol::{Command, CommandMessage, CommandResponse, IncomingMessage};

use super::{CommandTransport, EventSink};

// ============================================================================
// Constants
// ============================================================================

/// Timeout for establishing the WebSocket connection.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default timeout for correlated commands.
pub(crate) const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum pending requests before rejecting new ones.
const MAX_PENDING_REQUESTS: usize = 100;

/// Bounded wait for the event loop to exit on disconnect.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

// ============================================================================
// Types
// ============================================================================

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Map of request IDs to response channels.
type CorrelationMap = FxHashMap<RequestId, oneshot::Sender<Result<CommandResponse>>>;

// ============================================================================
// ConnectionState
// ============================================================================

/// Lifecycle state of the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No transport established.
    Disconnected,
    /// Handshake in progress.
    Connecting,
    /// Transport open, dispatch loop running.
    Connected,
    /// Shutdown requested, loop draining.
    Closing,
}

// ============================================================================
// ConnectionCommand
// ============================================================================

/// Internal commands for the event loop.
enum ConnectionCommand {
    /// Send a command frame, optionally registering a correlation slot.
    Send {
        request_id: RequestId,
        frame: String,
        response_tx: Option<oneshot::Sender<Result<CommandResponse>>>,
    },
    /// Remove a timed-out correlation entry.
    RemoveCorrelation(RequestId),
    /// Shutdown the connection.
    Shutdown,
}

// ============================================================================
// Connection
// ============================================================================

/// WebSocket connection to the remote debugging endpoint.
///
/// Handles request/response correlation and event routing. The
/// connection spawns an internal event loop task on the runtime that
/// called [`Connection::connect`].
///
/// # Thread Safety
///
/// `Connection` is `Send + Sync`; wrap it in an `Arc` to share it with
/// capture utilities running on other execution contexts. All
/// operations are non-blocking.
#[derive(Debug)]
pub struct Connection {
    /// Channel for sending commands to the event loop.
    command_tx: mpsc::UnboundedSender<ConnectionCommand>,
    /// Request id counter; ids are never reused while pending.
    next_id: AtomicU64,
    /// Correlation map (shared with event loop).
    correlation: Arc<Mutex<CorrelationMap>>,
    /// Event sink (shared with event loop); single, replaceable.
    event_sink: Arc<Mutex<Option<EventSink>>>,
    /// Connection state (shared with event loop).
    state: Arc<Mutex<ConnectionState>>,
    /// Signals `true` once the event loop has exited.
    closed_rx: watch::Receiver<bool>,
}

impl Connection {
    /// Connects to a debugging endpoint WebSocket URL.
    ///
    /// Spawns the event loop task internally.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if the URL is not a `ws`/`wss` URL
    /// - [`Error::Connection`] if the endpoint is unreachable
    /// - [`Error::ConnectionTimeout`] if the handshake does not complete
    pub async fn connect(ws_url: &str) -> Result<Self> {
        let parsed = url::Url::parse(ws_url)
            .map_err(|e| Error::config(format!("invalid debugging URL {ws_url}: {e}")))?;
        if !matches!(parsed.scheme(), "ws" | "wss") {
            return Err(Error::config(format!(
                "debugging URL must be ws:// or wss://, got {}",
                parsed.scheme()
            )));
        }

        debug!(url = %ws_url, "Connecting to debugging endpoint");

        let (ws_stream, _) = timeout(CONNECT_TIMEOUT, tokio_tungstenite::connect_async(ws_url))
            .await
            .map_err(|_| Error::connection_timeout(CONNECT_TIMEOUT.as_millis() as u64))?
            .map_err(|e| Error::connection(e.to_string()))?;

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let correlation: Arc<Mutex<CorrelationMap>> = Arc::new(Mutex::new(FxHashMap::default()));
        let event_sink: Arc<Mutex<Option<EventSink>>> = Arc::new(Mutex::new(None));
        let state = Arc::new(Mutex::new(ConnectionState::Connected));
        let (closed_tx, closed_rx) = watch::channel(false);

        tokio::spawn(Self::run_event_loop(
            ws_stream,
            command_rx,
            Arc::clone(&correlation),
            Arc::clone(&event_sink),
            Arc::clone(&state),
            closed_tx,
        ));

        debug!(url = %ws_url, "Connection established");

        Ok(Self {
            command_tx,
            next_id: AtomicU64::new(1),
            correlation,
            event_sink,
            state,
            closed_rx,
        })
    }

    /// Returns the current connection state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state.lock()
    }

    /// Returns `true` if the dispatch loop is running.
    #[inline]
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Returns the number of pending requests.
    #[inline]
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.correlation.lock().len()
    }

    /// Registers the event sink, replacing any previous one.
    ///
    /// Events are delivered to the sink in arrival order. The sink is
    /// single and replaceable, not multicast.
    pub fn set_event_sink(&self, sink: EventSink) {
        *self.event_sink.lock() = Some(sink);
    }

    /// Sends a correlated command and waits for its response value.
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectionClosed`] if the connection is closed
    /// - [`Error::RequestTimeout`] if no response arrives within `request_timeout`
    /// - [`Error::Command`] if the browser rejected the command
    pub async fn send_with_timeout(
        &self,
        command: Command,
        session_id: Option<&SessionId>,
        request_timeout: Duration,
    ) -> Result<Value> {
        // Check pending request limit
        {
            let correlation = self.correlation.lock();
            if correlation.len() >= MAX_PENDING_REQUESTS {
                warn!(
                    pending = correlation.len(),
                    max = MAX_PENDING_REQUESTS,
                    "Too many pending requests"
                );
                return Err(Error::protocol(format!(
                    "Too many pending requests: {}/{}",
                    correlation.len(),
                    MAX_PENDING_REQUESTS
                )));
            }
        }

        let request_id = RequestId::new(self.next_id.fetch_add(1, Ordering::SeqCst));
        let method = command.method();
        let frame = to_string(&CommandMessage::new(
            request_id,
            command,
            session_id.cloned(),
        ))?;

        let (response_tx, response_rx) = oneshot::channel();

        self.command_tx
            .send(ConnectionCommand::Send {
                request_id,
                frame,
                response_tx: Some(response_tx),
            })
            .map_err(|_| Error::ConnectionClosed)?;

        match timeout(request_timeout, response_rx).await {
            Ok(Ok(result)) => result?.into_result(),
            Ok(Err(_)) => Err(Error::ConnectionClosed),
            Err(_) => {
                // Timeout - clean up correlation entry so the late
                // response is dropped as unknown-id
                let _ = self
                    .command_tx
                    .send(ConnectionCommand::RemoveCorrelation(request_id));

                trace!(%request_id, method, "Request timed out");
                Err(Error::request_timeout(
                    request_id,
                    request_timeout.as_millis() as u64,
                ))
            }
        }
    }

    /// Writes a command frame without waiting for its response.
    ///
    /// A fresh id is still assigned; the eventual response is dropped
    /// by the loop as a response for an unknown id.
    pub fn post_command(&self, command: Command, session_id: Option<&SessionId>) -> Result<()> {
        let request_id = RequestId::new(self.next_id.fetch_add(1, Ordering::SeqCst));
        let frame = to_string(&CommandMessage::new(
            request_id,
            command,
            session_id.cloned(),
        ))?;

        self.command_tx
            .send(ConnectionCommand::Send {
                request_id,
                frame,
                response_tx: None,
            })
            .map_err(|_| Error::ConnectionClosed)
    }

    /// Shuts down the connection and waits for the loop to exit.
    ///
    /// Cancels all pending request handles with
    /// [`Error::ConnectionClosed`]. Idempotent.
    pub async fn disconnect(&self) {
        {
            let mut state = self.state.lock();
            if matches!(
                *state,
                ConnectionState::Closing | ConnectionState::Disconnected
            ) {
                return;
            }
            *state = ConnectionState::Closing;
        }

        let _ = self.command_tx.send(ConnectionCommand::Shutdown);

        let mut closed_rx = self.closed_rx.clone();
        let wait = async {
            while !*closed_rx.borrow() {
                if closed_rx.changed().await.is_err() {
                    break;
                }
            }
        };
        if timeout(SHUTDOWN_TIMEOUT, wait).await.is_err() {
            warn!("Event loop did not exit within shutdown timeout");
        }
    }

    // ========================================================================
    // Event Loop
    // ========================================================================

    /// Event loop that handles WebSocket I/O.
    async fn run_event_loop(
        ws_stream: WsStream,
        mut command_rx: mpsc::UnboundedReceiver<ConnectionCommand>,
        correlation: Arc<Mutex<CorrelationMap>>,
        event_sink: Arc<Mutex<Option<EventSink>>>,
        state: Arc<Mutex<ConnectionState>>,
        closed_tx: watch::Sender<bool>,
    ) {
        let (mut ws_write, mut ws_read) = ws_stream.split();

        loop {
            tokio::select! {
                // Incoming messages from the browser
                message = ws_read.next() => {
                    match message {
                        Some(Ok(Message::Text(text))) => {
                            Self::handle_incoming_message(&text, &correlation, &event_sink);
                        }

                        Some(Ok(Message::Close(_))) => {
                            debug!("WebSocket closed by remote");
                            break;
                        }

                        Some(Err(e)) => {
                            error!(error = %e, "WebSocket error");
                            break;
                        }

                        None => {
                            debug!("WebSocket stream ended");
                            break;
                        }

                        // Ignore Binary, Ping, Pong
                        _ => {}
                    }
                }

                // Commands from the observer side
                command = command_rx.recv() => {
                    match command {
                        Some(ConnectionCommand::Send { request_id, frame, response_tx }) => {
                            Self::handle_send_command(
                                request_id,
                                frame,
                                response_tx,
                                &mut ws_write,
                                &correlation,
                            ).await;
                        }

                        Some(ConnectionCommand::RemoveCorrelation(request_id)) => {
                            correlation.lock().remove(&request_id);
                            trace!(%request_id, "Removed timed-out correlation");
                        }

                        Some(ConnectionCommand::Shutdown) => {
                            debug!("Shutdown command received");
                            let _ = ws_write.close().await;
                            break;
                        }

                        None => {
                            debug!("Command channel closed");
                            break;
                        }
                    }
                }
            }
        }

        // Bulk-cancel pending requests on teardown
        Self::fail_pending_requests(&correlation);
        *state.lock() = ConnectionState::Disconnected;
        let _ = closed_tx.send(true);

        debug!("Event loop terminated");
    }

    /// Routes an incoming text frame by shape.
    fn handle_incoming_message(
        text: &str,
        correlation: &Arc<Mutex<CorrelationMap>>,
        event_sink: &Arc<Mutex<Option<EventSink>>>,
    ) {
        match IncomingMessage::parse(text) {
            Ok(IncomingMessage::Response(response)) => {
                let tx = correlation.lock().remove(&response.id);
                if let Some(tx) = tx {
                    let _ = tx.send(Ok(response));
                } else {
                    // Uncorrelated: posted command or timed-out request
                    trace!(id = %response.id, "Dropping response for unknown request");
                }
            }

            Ok(IncomingMessage::Event(event)) => {
                let sink = event_sink.lock();
                if let Some(ref sink) = *sink
                    && sink.send(event).is_err()
                {
                    trace!("Event sink dropped; discarding event");
                }
            }

            Err(e) => {
                warn!(error = %e, "Failed to parse incoming message");
            }
        }
    }

    /// Handles a send command from the observer side.
    async fn handle_send_command(
        request_id: RequestId,
        frame: String,
        response_tx: Option<oneshot::Sender<Result<CommandResponse>>>,
        ws_write: &mut futures_util::stream::SplitSink<WsStream, Message>,
        correlation: &Arc<Mutex<CorrelationMap>>,
    ) {
        // Store correlation before sending so a fast response cannot race
        let correlated = response_tx.is_some();
        if let Some(tx) = response_tx {
            correlation.lock().insert(request_id, tx);
        }

        if let Err(e) = ws_write.send(Message::Text(frame.into())).await {
            if let Some(tx) = correlation.lock().remove(&request_id) {
                let _ = tx.send(Err(Error::connection(e.to_string())));
            } else {
                warn!(%request_id, error = %e, "Failed to write posted command");
            }
            return;
        }

        trace!(%request_id, correlated, "Command sent");
    }

    /// Fails all pending requests with ConnectionClosed.
    fn fail_pending_requests(correlation: &Arc<Mutex<CorrelationMap>>) {
        let pending: Vec<_> = correlation.lock().drain().collect();
        let count = pending.len();

        for (_, tx) in pending {
            let _ = tx.send(Err(Error::ConnectionClosed));
        }

        if count > 0 {
            debug!(count, "Cancelled pending requests on shutdown");
        }
    }
}

// ============================================================================
// CommandTransport Implementation
// ============================================================================

#[async_trait::async_trait]
impl CommandTransport for Connection {
    async fn send(
        &self,
        command: Command,
        session_id: Option<&SessionId>,
        request_timeout: Duration,
    ) -> Result<Value> {
        self.send_with_timeout(command, session_id, request_timeout)
            .await
    }

    async fn post(&self, command: Command, session_id: Option<&SessionId>) -> Result<()> {
        self.post_command(command, session_id)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constants() {
        assert_eq!(DEFAULT_COMMAND_TIMEOUT.as_secs(), 30);
        assert_eq!(MAX_PENDING_REQUESTS, 100);
    }

    #[test]
    fn test_request_id_monotonic() {
        let counter = AtomicU64::new(1);
        assert_eq!(counter.fetch_add(1, Ordering::SeqCst), 1);
        assert_eq!(counter.fetch_add(1, Ordering::SeqCst), 2);
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_connect_rejects_non_ws_url() {
        let err = Connection::connect("http://localhost:9222").await.unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[tokio::test]
    async fn test_connect_rejects_malformed_url() {
        let err = Connection::connect("not a url").await.unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }
}
