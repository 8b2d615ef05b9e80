//! Trace queue and dispatch.
//!
//! Capture events enter a single FIFO and a dedicated worker forwards
//! them to the backend, enriching along the way.

// ============================================================================
// Submodules
// ============================================================================

/// Trace event model.
pub mod event;

/// FIFO dispatcher worker.
pub mod dispatcher;

// ============================================================================
// Re-exports
// ============================================================================

pub use dispatcher::{CaptureSource, TraceDispatcher, truncate_dom};
pub use event::{TraceEvent, TraceKind};
