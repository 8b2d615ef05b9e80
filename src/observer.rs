//! Browser session observer.
//!
//! The observer ties the pieces together: one connection, the session
//! registry, the capture utilities, and the screencast pipeline. It owns
//! the task that drains protocol events and reacts to target lifecycle
//! changes while a recording or capture is in flight.
//!
//! # Execution Contexts
//!
//! Three contexts touch observer state:
//!
//! 1. The caller, through the public capture and lifecycle methods.
//! 2. The connection event loop, which only forwards into the sink.
//! 3. The event task spawned by [`Observer::start`], which handles
//!    frames and target lifecycle serially, in arrival order.
//!
//! [`BackgroundObserver`] adds a fourth: a dedicated OS thread owning a
//! current-thread runtime, for hosts whose own runtime must not block
//! on observation.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::sync::mpsc as std_mpsc;
use std::thread;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{Notify, mpsc};
use tracing::{debug, error, info, trace, warn};

use crate::capture::{
    DomCapture, ScreencastPipeline, ScreenshotCapture, VideoArtifact,
};
use crate::config::ObserverConfig;
use crate::error::Result;
use crate::protocol::{ParsedEvent, ProtocolEvent};
use crate::session::SessionRegistry;
use crate::trace::CaptureSource;
use crate::transport::{CommandTransport, Connection};

// ============================================================================
// PageCaptures
// ============================================================================

/// Capture surface bound to whichever page session is currently attached.
///
/// All methods resolve to sentinel values when no session exists.
struct PageCaptures {
    registry: Arc<SessionRegistry>,
    screenshot: ScreenshotCapture,
    dom: DomCapture,
}

#[async_trait]
impl CaptureSource for PageCaptures {
    async fn screenshot(&self) -> Option<String> {
        let session = self.registry.first_session()?;
        self.screenshot.capture(Some(&session)).await
    }

    async fn snapshot(&self) -> String {
        match self.registry.first_session() {
            Some(session) => self.dom.capture(Some(&session)).await,
            None => String::new(),
        }
    }
}

// ============================================================================
// EventWorker
// ============================================================================

/// Drains the connection's event sink and reacts to lifecycle events.
struct EventWorker {
    registry: Arc<SessionRegistry>,
    screencast: Arc<ScreencastPipeline>,
}

impl EventWorker {
    async fn run(self, mut rx: mpsc::UnboundedReceiver<ProtocolEvent>) {
        while let Some(event) = rx.recv().await {
            self.handle(event).await;
        }
        debug!("Event worker stopped");
    }

    /// Handles one event. Serial by construction; a slow frame ack
    /// back-pressures subsequent events rather than racing them.
    async fn handle(&self, event: ProtocolEvent) {
        let event_session = event.session_id.clone();

        match event.parse() {
            ParsedEvent::ScreencastFrame {
                data,
                metadata,
                ack_id,
            } => {
                let Some(session) = event_session else {
                    warn!("Screencast frame without session scope; dropped");
                    return;
                };
                if let Err(e) = self
                    .screencast
                    .handle_frame(data, metadata, ack_id, session)
                    .await
                {
                    warn!(error = %e, "Failed to acknowledge screencast frame");
                }
            }

            ParsedEvent::TargetCreated { target } => {
                if self.registry.handle_target_created(&target).await {
                    self.registry.enable_domains_on_all_sessions().await;

                    if let Some(session) = self.registry.session_for_target(&target.target_id)
                        && let Err(e) = self.screencast.start_session(&session).await
                    {
                        warn!(session = %session, error = %e, "Failed to extend screencast");
                    }
                }
            }

            ParsedEvent::TargetDestroyed { target_id } => {
                self.registry.handle_target_destroyed(&target_id);
            }

            ParsedEvent::DetachedFromTarget { session_id } => {
                self.registry.handle_session_detached(&session_id);
            }

            ParsedEvent::Unknown { method } => {
                trace!(method, "Ignoring protocol event");
            }
        }
    }
}

// ============================================================================
// Observer
// ============================================================================

/// Observes one browser over its remote debugging endpoint.
pub struct Observer {
    connection: Arc<Connection>,
    registry: Arc<SessionRegistry>,
    captures: Arc<PageCaptures>,
    screencast: Arc<ScreencastPipeline>,
    event_task: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl Observer {
    /// Connects to the debugging endpoint and assembles the observer.
    ///
    /// # Errors
    ///
    /// Returns connection errors when the endpoint is unreachable or the
    /// URL is not a WebSocket URL.
    pub async fn connect(ws_url: &str, config: ObserverConfig) -> Result<Self> {
        let connection = Arc::new(Connection::connect(ws_url).await?);
        let transport: Arc<dyn CommandTransport> = connection.clone();

        let registry = Arc::new(SessionRegistry::new(
            Arc::clone(&transport),
            config.bootstrap_url.clone(),
            config.bootstrap_settle,
        ));

        let captures = Arc::new(PageCaptures {
            registry: Arc::clone(&registry),
            screenshot: ScreenshotCapture::new(Arc::clone(&transport), config.screenshot.clone()),
            dom: DomCapture::new(Arc::clone(&transport), config.screenshot.clone()),
        });

        let screencast = Arc::new(ScreencastPipeline::new(
            Arc::clone(&transport),
            config.screencast.clone(),
        ));

        Ok(Self {
            connection,
            registry,
            captures,
            screencast,
            event_task: Mutex::new(None),
        })
    }

    /// Attaches to all page targets and starts handling events.
    ///
    /// # Errors
    ///
    /// Returns transport errors from target enumeration; domain-enable
    /// and individual attach failures are logged, not propagated.
    pub async fn start(&self) -> Result<()> {
        self.registry.attach_to_all_page_targets().await?;
        self.registry.enable_domains_on_all_sessions().await;

        let (tx, rx) = mpsc::unbounded_channel();
        self.connection.set_event_sink(tx);

        let worker = EventWorker {
            registry: Arc::clone(&self.registry),
            screencast: Arc::clone(&self.screencast),
        };
        *self.event_task.lock() = Some(tokio::spawn(worker.run(rx)));

        info!(sessions = self.registry.session_count(), "Observer started");
        Ok(())
    }

    /// Stops event handling and closes the connection.
    ///
    /// An in-flight recording is stopped first; its video, if any, is
    /// discarded. Idempotent and safe after a failed [`start`].
    ///
    /// [`start`]: Observer::start
    pub async fn stop(&self) {
        if self.screencast.is_recording()
            && let Some(artifact) = self.end_screencast().await
        {
            debug!(path = %artifact.path.display(), "Discarding video from implicit stop");
        }

        if let Some(task) = self.event_task.lock().take() {
            task.abort();
        }

        self.connection.disconnect().await;
        self.screencast.cleanup();
        info!("Observer stopped");
    }

    // ========================================================================
    // Capture Surface
    // ========================================================================

    /// Captures a screenshot of the current page.
    ///
    /// `None` when no session is attached or capture failed.
    pub async fn screenshot(&self) -> Option<String> {
        self.captures.screenshot().await
    }

    /// Captures a DOM snapshot of the current page.
    ///
    /// Empty when no session is attached or capture failed.
    pub async fn snapshot(&self) -> String {
        self.captures.snapshot().await
    }

    /// Shared capture source for trace enrichment.
    #[must_use]
    pub fn capture_source(&self) -> Arc<dyn CaptureSource> {
        self.captures.clone()
    }

    // ========================================================================
    // Screencast
    // ========================================================================

    /// Starts screencast recording on every attached session.
    pub async fn start_screencast(&self) -> Result<()> {
        self.screencast.start(&self.registry.session_ids()).await
    }

    /// Stops recording and returns the assembled video, if any.
    pub async fn end_screencast(&self) -> Option<VideoArtifact> {
        self.screencast.stop(&self.registry.session_ids()).await
    }

    /// Returns the number of attached page sessions.
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.registry.session_count()
    }
}

// ============================================================================
// BackgroundObserver
// ============================================================================

/// Runs an [`Observer`] on a dedicated OS thread.
///
/// The thread owns a current-thread runtime, connects, starts the
/// observer, and parks until [`stop`] is signalled.
///
/// [`stop`]: BackgroundObserver::stop
pub struct BackgroundObserver {
    stop: Arc<Notify>,
    worker: Mutex<Option<(thread::JoinHandle<()>, std_mpsc::Receiver<()>)>>,
}

impl BackgroundObserver {
    /// Spawns the observation thread.
    ///
    /// Connection or start failures are logged on the thread; the handle
    /// stays valid and [`stop`] remains safe to call.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the thread cannot be spawned.
    ///
    /// [`stop`]: BackgroundObserver::stop
    /// [`Error::Io`]: crate::error::Error::Io
    pub fn start(ws_url: impl Into<String>, config: ObserverConfig) -> Result<Self> {
        let ws_url = ws_url.into();
        let stop = Arc::new(Notify::new());
        let stop_signal = Arc::clone(&stop);
        let (done_tx, done_rx) = std_mpsc::channel();

        let handle = thread::Builder::new()
            .name("cdp-observer".to_string())
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(runtime) => runtime,
                    Err(e) => {
                        error!(error = %e, "Failed to build observer runtime");
                        let _ = done_tx.send(());
                        return;
                    }
                };

                runtime.block_on(async move {
                    match Observer::connect(&ws_url, config).await {
                        Ok(observer) => {
                            match observer.start().await {
                                Ok(()) => stop_signal.notified().await,
                                Err(e) => error!(error = %e, "Observer start failed"),
                            }
                            observer.stop().await;
                        }
                        Err(e) => error!(error = %e, "Observer connection failed"),
                    }
                });

                let _ = done_tx.send(());
            })?;

        Ok(Self {
            stop,
            worker: Mutex::new(Some((handle, done_rx))),
        })
    }

    /// Signals the observation thread to stop and joins it.
    ///
    /// Waits up to `timeout`; a thread that does not finish in time is
    /// abandoned with a warning. Idempotent.
    pub fn stop(&self, timeout: Duration) {
        let Some((handle, done_rx)) = self.worker.lock().take() else {
            return;
        };

        // A stored permit covers the race where the thread has not
        // reached notified() yet
        self.stop.notify_one();

        match done_rx.recv_timeout(timeout) {
            Ok(()) => {
                let _ = handle.join();
                debug!("Observer thread joined");
            }
            Err(_) => {
                warn!(
                    timeout_ms = timeout.as_millis() as u64,
                    "Observer thread did not stop in time; abandoning"
                );
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ScreencastOptions, ScreenshotOptions};
    use crate::identifiers::{SessionId, TargetId};
    use crate::testing::MockTransport;
    use serde_json::json;

    fn worker_with(transport: Arc<MockTransport>) -> EventWorker {
        let registry = Arc::new(SessionRegistry::new(
            Arc::clone(&transport) as Arc<dyn CommandTransport>,
            "https://example.com",
            Duration::from_secs(2),
        ));
        let screencast = Arc::new(ScreencastPipeline::new(
            Arc::clone(&transport) as Arc<dyn CommandTransport>,
            ScreencastOptions::default(),
        ));
        EventWorker {
            registry,
            screencast,
        }
    }

    fn frame_event(session: &str, ack_id: u64) -> ProtocolEvent {
        ProtocolEvent {
            method: "Page.screencastFrame".to_string(),
            params: json!({"data": "QUJD", "metadata": {}, "sessionId": ack_id}),
            session_id: Some(SessionId::from(session)),
        }
    }

    fn created_event(target_id: &str) -> ProtocolEvent {
        ProtocolEvent {
            method: "Target.targetCreated".to_string(),
            params: json!({"targetInfo": {
                "targetId": target_id, "type": "page", "url": "about:blank",
                "title": "", "attached": false,
            }}),
            session_id: None,
        }
    }

    #[tokio::test]
    async fn test_frame_event_buffered_and_acked() {
        let transport = Arc::new(MockTransport::new());
        let worker = worker_with(Arc::clone(&transport));
        worker
            .screencast
            .start(&[SessionId::from("S1")])
            .await
            .expect("start");

        worker.handle(frame_event("S1", 11)).await;

        assert_eq!(worker.screencast.frame_count(), 1);
        let acks = transport.calls_for("Page.screencastFrameAck");
        assert_eq!(acks.len(), 1);
        assert_eq!(acks[0].body["params"]["sessionId"], 11);
    }

    #[tokio::test]
    async fn test_created_target_joins_active_recording() {
        let transport = Arc::new(MockTransport::new());
        transport.respond("Target.attachToTarget", json!({"sessionId": "S2"}));

        let worker = worker_with(Arc::clone(&transport));
        worker
            .screencast
            .start(&[SessionId::from("S1")])
            .await
            .expect("start");

        worker.handle(created_event("T2")).await;

        assert_eq!(worker.registry.session_count(), 1);
        // Domains enabled on the new session
        assert_eq!(transport.calls_for("Page.enable").len(), 1);
        // Recording extended to it
        let starts = transport.calls_for("Page.startScreencast");
        assert_eq!(starts.len(), 2);
        assert_eq!(starts[1].session_id, Some(SessionId::from("S2")));
    }

    #[tokio::test]
    async fn test_created_target_without_recording_only_attaches() {
        let transport = Arc::new(MockTransport::new());
        transport.respond("Target.attachToTarget", json!({"sessionId": "S2"}));

        let worker = worker_with(Arc::clone(&transport));
        worker.handle(created_event("T2")).await;

        assert_eq!(worker.registry.session_count(), 1);
        assert!(transport.calls_for("Page.startScreencast").is_empty());
    }

    #[tokio::test]
    async fn test_detach_events_prune_registry() {
        let transport = Arc::new(MockTransport::new());
        transport.respond("Target.attachToTarget", json!({"sessionId": "S1"}));

        let worker = worker_with(Arc::clone(&transport));
        worker.handle(created_event("T1")).await;
        assert_eq!(worker.registry.session_count(), 1);

        worker
            .handle(ProtocolEvent {
                method: "Target.detachedFromTarget".to_string(),
                params: json!({"sessionId": "S1"}),
                session_id: None,
            })
            .await;

        assert_eq!(worker.registry.session_count(), 0);
        assert_eq!(
            worker.registry.session_for_target(&TargetId::from("T1")),
            None
        );
    }

    #[tokio::test]
    async fn test_frame_without_session_scope_is_dropped() {
        let transport = Arc::new(MockTransport::new());
        let worker = worker_with(Arc::clone(&transport));
        worker
            .screencast
            .start(&[SessionId::from("S1")])
            .await
            .expect("start");

        let mut event = frame_event("S1", 3);
        event.session_id = None;
        worker.handle(event).await;

        assert_eq!(worker.screencast.frame_count(), 0);
        assert!(transport.calls_for("Page.screencastFrameAck").is_empty());
    }

    #[tokio::test]
    async fn test_capture_surface_without_session() {
        let transport = Arc::new(MockTransport::new());
        let registry = Arc::new(SessionRegistry::new(
            Arc::clone(&transport) as Arc<dyn CommandTransport>,
            "https://example.com",
            Duration::from_secs(2),
        ));
        let captures = PageCaptures {
            registry,
            screenshot: ScreenshotCapture::new(
                Arc::clone(&transport) as Arc<dyn CommandTransport>,
                ScreenshotOptions::default(),
            ),
            dom: DomCapture::new(
                Arc::clone(&transport) as Arc<dyn CommandTransport>,
                ScreenshotOptions::default(),
            ),
        };

        assert!(captures.screenshot().await.is_none());
        assert!(captures.snapshot().await.is_empty());
        // No commands were issued at all
        assert!(transport.calls().is_empty());
    }
}
