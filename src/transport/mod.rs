//! WebSocket transport layer.
//!
//! This module handles communication with the remote debugging endpoint.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐                            ┌─────────────────┐
//! │ Observer (Rust)  │                            │  Browser        │
//! │                  │         WebSocket          │  (debugging     │
//! │  Connection ─────│◄──────────────────────────►│   endpoint)     │
//! │  event loop task │      ws://host:port/...    │                 │
//! └──────────────────┘                            └─────────────────┘
//! ```
//!
//! # Connection Lifecycle
//!
//! 1. [`Connection::connect`] - Open the WebSocket, spawn the event loop
//! 2. [`Connection::set_event_sink`] - Register the event consumer
//! 3. Send correlated commands / post fire-and-forget commands
//! 4. [`Connection::disconnect`] - Close, cancel pending, stop the loop
//!
//! There is no reconnection; a dropped connection requires a fresh
//! observer.

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use serde_json::Value;
use tokio::sync::mpsc;

use crate::error::Result;
use crate::identifiers::SessionId;
use crate::protocol::{Command, ProtocolEvent};

// ============================================================================
// Submodules
// ============================================================================

/// WebSocket connection and event loop.
pub mod connection;

// ============================================================================
// Types
// ============================================================================

/// Sink receiving protocol events in arrival order.
///
/// Single and replaceable, not multicast; the observer drains it on a
/// dedicated task.
pub type EventSink = mpsc::UnboundedSender<ProtocolEvent>;

// ============================================================================
// CommandTransport
// ============================================================================

/// Seam over the connection used by session and capture components.
///
/// Every call carries an explicit timeout (or is fire-and-forget) and
/// resolves rather than blocking indefinitely, so callers on other
/// execution contexts can treat failures as sentinel values.
#[async_trait::async_trait]
pub trait CommandTransport: Send + Sync {
    /// Sends a correlated command and waits for its result value.
    async fn send(
        &self,
        command: Command,
        session_id: Option<&SessionId>,
        request_timeout: Duration,
    ) -> Result<Value>;

    /// Writes a command without waiting for its response.
    async fn post(&self, command: Command, session_id: Option<&SessionId>) -> Result<()>;
}

// ============================================================================
// Re-exports
// ============================================================================

pub use connection::{Connection, ConnectionState};
pub(crate) use connection::DEFAULT_COMMAND_TIMEOUT;
