//! Capture utilities: screenshots, DOM snapshots, and screencast video.
//!
//! All capture is best-effort. On-demand capture (screenshot, DOM)
//! retries within a bounded budget and resolves to a sentinel value on
//! exhaustion; continuous capture (screencast) degrades per session and
//! resolves to "no video" when assembly fails.

// ============================================================================
// Submodules
// ============================================================================

/// Structured DOM snapshot capture.
pub mod dom;

/// Screencast frame buffering and recording lifecycle.
pub mod screencast;

/// On-demand screenshot capture.
pub mod screenshot;

/// External-encoder video assembly.
pub mod video;

// ============================================================================
// Re-exports
// ============================================================================

pub use dom::DomCapture;
pub use screencast::{ScreencastFrame, ScreencastPipeline, VideoArtifact};
pub use screenshot::ScreenshotCapture;
pub use video::VideoEncoder;
