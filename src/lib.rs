//! # cdp-observe
//!
//! Non-invasive observation of browser sessions over the Chrome DevTools
//! Protocol: structured logs, screenshots, DOM snapshots, and screen
//! recordings, forwarded as ordered telemetry to an observability
//! backend without blocking the observed workload.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │ Observer                                                    │
//! │                                                             │
//! │  Connection ──► event sink ──► event task                   │
//! │      │                          │    │                      │
//! │      │              SessionRegistry  ScreencastPipeline     │
//! │      │                               │                      │
//! │  ScreenshotCapture / DomCapture      VideoEncoder (ffmpeg)  │
//! └──────┬──────────────────────────────────────────────────────┘
//!        │ CaptureSource
//! ┌──────▼──────────────┐      ┌────────────────┐
//! │ TraceDispatcher     │─────►│ BackendClient  │
//! │ (FIFO, enrichment)  │      │ (impl by host) │
//! └─────────────────────┘      └────────────────┘
//! ```
//!
//! One WebSocket connection runs a single event loop; discovered page
//! targets are attached with flat session addressing and tracked by the
//! registry. Capture is best-effort throughout: failures resolve to
//! sentinel values (`None`, empty) and are logged, never propagated to
//! the observed session.
//!
//! # Quick Start
//!
//! ```ignore
//! use cdp_observe::{Observer, ObserverConfig};
//!
//! #[tokio::main]
//! async fn main() -> cdp_observe::Result<()> {
//!     let observer = Observer::connect(
//!         "ws://127.0.0.1:9222/devtools/browser/abc",
//!         ObserverConfig::default(),
//!     )
//!     .await?;
//!     observer.start().await?;
//!
//!     observer.start_screencast().await?;
//!     let screenshot = observer.screenshot().await;
//!     let video = observer.end_screencast().await;
//!
//!     observer.stop().await;
//!     Ok(())
//! }
//! ```

// ============================================================================
// Modules
// ============================================================================

/// Observability backend contract.
pub mod backend;

/// Screenshot, DOM snapshot, and screencast capture.
pub mod capture;

/// Observer configuration options.
pub mod config;

/// Error types.
pub mod error;

/// Identifier newtypes.
pub mod identifiers;

/// The observer and its background runner.
pub mod observer;

/// Wire protocol commands, responses, and events.
pub mod protocol;

/// Target discovery and session management.
pub mod session;

/// Test doubles shared across unit tests.
#[cfg(test)]
pub(crate) mod testing;

/// Trace queue and dispatch.
pub mod trace;

/// WebSocket transport layer.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

pub use backend::{BackendClient, MediaType};
pub use capture::{DomCapture, ScreencastPipeline, ScreenshotCapture, VideoArtifact, VideoEncoder};
pub use config::{DispatcherOptions, ObserverConfig, ScreencastOptions, ScreenshotOptions};
pub use error::{Error, Result};
pub use identifiers::{RequestId, SessionId, TargetId};
pub use observer::{BackgroundObserver, Observer};
pub use session::SessionRegistry;
pub use trace::{CaptureSource, TraceDispatcher, TraceEvent, TraceKind};
pub use transport::{CommandTransport, Connection, ConnectionState};
