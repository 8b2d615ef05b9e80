//! Async FIFO trace dispatcher.
//!
//! Bridges capture events to the backend from a dedicated worker thread
//! so capture and protocol handling never block on backend latency.
//! Events are processed strictly in arrival order; enrichment (screenshot
//! plus DOM snapshot) runs under a total deadline and degrades to the
//! bare event when it cannot finish in time.
//!
//! Delivery is at-most-once: a trace that fails at the backend is logged
//! and dropped, never retried.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::sync::mpsc as std_mpsc;
use std::thread;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use crate::backend::{BackendClient, MediaType};
use crate::config::DispatcherOptions;
use crate::trace::event::{TraceEvent, TraceKind};

// ============================================================================
// CaptureSource
// ============================================================================

/// Source of page state used to enrich traces.
///
/// Both methods are best-effort and resolve to sentinel values.
#[async_trait]
pub trait CaptureSource: Send + Sync {
    /// Captures a screenshot data URI, `None` when unavailable.
    async fn screenshot(&self) -> Option<String>;

    /// Captures a DOM snapshot string, empty when unavailable.
    async fn snapshot(&self) -> String;
}

// ============================================================================
// DOM Truncation
// ============================================================================

/// Truncates a DOM snapshot to `limit` characters.
///
/// Appends `... [truncated N chars]` where `N` is the number of
/// characters removed.
#[must_use]
pub fn truncate_dom(dom: &str, limit: usize) -> String {
    let total = dom.chars().count();
    if total <= limit {
        return dom.to_string();
    }
    let kept: String = dom.chars().take(limit).collect();
    let removed = total - limit;
    format!("{kept}... [truncated {removed} chars]")
}

// ============================================================================
// Worker
// ============================================================================

enum QueueItem {
    Event(TraceEvent),
    Shutdown,
}

async fn run_worker(
    mut rx: mpsc::UnboundedReceiver<QueueItem>,
    backend: Arc<dyn BackendClient>,
    source: Arc<dyn CaptureSource>,
    options: DispatcherOptions,
) {
    while let Some(item) = rx.recv().await {
        match item {
            QueueItem::Event(event) => process_event(event, &*backend, &*source, &options).await,
            QueueItem::Shutdown => break,
        }
    }
    debug!("Trace dispatcher worker stopped");
}

async fn process_event(
    event: TraceEvent,
    backend: &dyn BackendClient,
    source: &dyn CaptureSource,
    options: &DispatcherOptions,
) {
    if !backend.has_session() {
        debug!(kind = %event.kind, "No backend session; trace discarded");
        return;
    }

    // Enriched events always land as tool traces, matching the page
    // state they are bundled with; plain events keep their own kind.
    let delivery_kind = if event.needs_enrichment {
        TraceKind::Tool
    } else {
        event.kind
    };

    if event.needs_enrichment {
        let enriched = tokio::time::timeout(
            options.enrichment_deadline,
            enrich_and_send(&event, backend, source, options),
        )
        .await;

        match enriched {
            Ok(()) => return,
            Err(_) => {
                warn!(
                    kind = %event.kind,
                    deadline_ms = options.enrichment_deadline.as_millis() as u64,
                    "Enrichment deadline exceeded; sending bare trace"
                );
            }
        }
    }

    if let Err(e) = backend.create_trace(delivery_kind, &event.content).await {
        warn!(kind = %delivery_kind, error = %e, "Failed to record trace");
    }
}

/// Sends screenshot, DOM trace, then the event itself as a tool trace.
///
/// Capture and backend failures along the way are logged and skipped;
/// the event trace at the end is always attempted. Cancellation by the
/// enrichment deadline can interrupt any step, in which case the caller
/// falls back to the bare event.
async fn enrich_and_send(
    event: &TraceEvent,
    backend: &dyn BackendClient,
    source: &dyn CaptureSource,
    options: &DispatcherOptions,
) {
    if let Some(screenshot) = source.screenshot().await {
        if let Err(e) = backend.upload_media(MediaType::Image, &screenshot).await {
            warn!(error = %e, "Failed to upload screenshot");
        }
    }

    let dom = source.snapshot().await;
    if !dom.is_empty() {
        let truncated = truncate_dom(&dom, options.dom_truncate_limit);
        if let Err(e) = backend.create_trace(TraceKind::Dom, &truncated).await {
            warn!(error = %e, "Failed to record DOM trace");
        }
    }

    if let Err(e) = backend.create_trace(TraceKind::Tool, &event.content).await {
        warn!(kind = %event.kind, error = %e, "Failed to record trace");
    }
}

// ============================================================================
// TraceDispatcher
// ============================================================================

/// Handle to the dispatcher worker thread.
///
/// The worker owns a current-thread runtime so enrichment can await
/// capture and backend calls without touching the caller's runtime.
pub struct TraceDispatcher {
    tx: mpsc::UnboundedSender<QueueItem>,
    drain_timeout: std::time::Duration,
    worker: Mutex<Option<(thread::JoinHandle<()>, std_mpsc::Receiver<()>)>>,
}

impl TraceDispatcher {
    /// Spawns the worker thread and returns the dispatch handle.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the worker thread cannot be spawned.
    ///
    /// [`Error::Io`]: crate::error::Error::Io
    pub fn spawn(
        backend: Arc<dyn BackendClient>,
        source: Arc<dyn CaptureSource>,
        options: DispatcherOptions,
    ) -> crate::error::Result<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        let (done_tx, done_rx) = std_mpsc::channel();
        let drain_timeout = options.drain_timeout;

        let handle = thread::Builder::new()
            .name("trace-dispatcher".to_string())
            .spawn(move || {
                match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(runtime) => runtime.block_on(run_worker(rx, backend, source, options)),
                    Err(e) => error!(error = %e, "Failed to build dispatcher runtime"),
                }
                let _ = done_tx.send(());
            })?;

        Ok(Self {
            tx,
            drain_timeout,
            worker: Mutex::new(Some((handle, done_rx))),
        })
    }

    /// Queues one event for dispatch. Never blocks.
    pub fn enqueue(&self, event: TraceEvent) {
        if self.tx.send(QueueItem::Event(event)).is_err() {
            warn!("Trace dispatcher stopped; event dropped");
        }
    }

    /// Stops the worker after draining already queued events.
    ///
    /// Waits up to the configured drain timeout; a worker that does not
    /// finish in time is abandoned. Idempotent.
    pub fn shutdown(&self) {
        let Some((handle, done_rx)) = self.worker.lock().take() else {
            return;
        };

        let _ = self.tx.send(QueueItem::Shutdown);

        match done_rx.recv_timeout(self.drain_timeout) {
            Ok(()) => {
                let _ = handle.join();
                debug!("Trace dispatcher drained and stopped");
            }
            Err(_) => {
                warn!(
                    timeout_ms = self.drain_timeout.as_millis() as u64,
                    "Trace dispatcher did not drain in time; abandoning worker"
                );
            }
        }
    }
}

impl Drop for TraceDispatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// ============================================================================
// Tests
// ============================================================================
