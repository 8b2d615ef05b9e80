//! Observability backend contract.
//!
//! The dispatcher forwards traces through this trait; concrete clients
//! (HTTP, gRPC, in-process) live outside this crate. Every method is
//! fallible and the callers here treat failures as log-and-continue.

// ============================================================================
// Imports
// ============================================================================

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;
use crate::trace::TraceKind;

// ============================================================================
// MediaType
// ============================================================================

/// Kind of media payload handed to [`BackendClient::upload_media`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaType {
    /// Single screenshot, base64 data URI.
    Image,
    /// Assembled screen recording, base64 data URI.
    Video,
}

impl MediaType {
    /// Wire label for the media kind.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Video => "video",
        }
    }
}

// ============================================================================
// BackendClient
// ============================================================================

/// Client for the observability backend receiving session telemetry.
#[async_trait]
pub trait BackendClient: Send + Sync {
    /// Opens a backend session for one observation run.
    async fn create_session(&self, prompt: &str, model: &str, params: Value) -> Result<()>;

    /// Returns `true` while a backend session is open.
    ///
    /// Traces dispatched without an open session are discarded.
    fn has_session(&self) -> bool;

    /// Records one trace in the current session.
    async fn create_trace(&self, kind: TraceKind, content: &str) -> Result<()>;

    /// Uploads a media payload (data URI) to the current session.
    async fn upload_media(&self, media_type: MediaType, data: &str) -> Result<()>;

    /// Updates session-level evaluation and result fields.
    async fn update_session(&self, evaluation: Option<Value>, result: Option<String>)
    -> Result<()>;

    /// Closes the current session on the backend.
    async fn end_session(&self) -> Result<()>;

    /// Releases client resources. Called once, after [`end_session`].
    ///
    /// [`end_session`]: BackendClient::end_session
    async fn close(&self) -> Result<()>;
}

// ============================================================================
// Tests
// ============================================================================
