//! On-demand screenshot capture with bounded retry.
//!
//! Capture is best-effort: every attempt carries its own timeout, the
//! retry budget is bounded, and exhaustion resolves to `None` rather
//! than an error. Callers treat `None` as "no screenshot available this
//! round", never as fatal.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use crate::config::ScreenshotOptions;
use crate::identifiers::SessionId;
use crate::protocol::{ClipRegion, PageCommand};
use crate::transport::CommandTransport;

// ============================================================================
// ScreenshotCapture
// ============================================================================

/// Captures single screenshots from attached pages.
pub struct ScreenshotCapture {
    transport: Arc<dyn CommandTransport>,
    options: ScreenshotOptions,
}

impl ScreenshotCapture {
    /// Creates a capture utility over the given transport.
    #[must_use]
    pub fn new(transport: Arc<dyn CommandTransport>, options: ScreenshotOptions) -> Self {
        Self { transport, options }
    }

    /// Captures a screenshot as a `data:image/png;base64,...` URI.
    ///
    /// Returns `None` if every attempt failed or timed out.
    pub async fn capture(&self, session_id: Option<&SessionId>) -> Option<String> {
        self.capture_with_clip(session_id, None).await
    }

    /// Captures a screenshot of a clip region, identical retry policy.
    pub async fn capture_element(
        &self,
        clip: ClipRegion,
        session_id: Option<&SessionId>,
    ) -> Option<String> {
        self.capture_with_clip(session_id, Some(clip)).await
    }

    async fn capture_with_clip(
        &self,
        session_id: Option<&SessionId>,
        clip: Option<ClipRegion>,
    ) -> Option<String> {
        let max_attempts = self.options.max_attempts();

        for attempt in 0..max_attempts {
            let command = PageCommand::CaptureScreenshot {
                format: "png".to_string(),
                quality: self.options.quality,
                clip,
            };

            match self
                .transport
                .send(command.into(), session_id, self.options.attempt_timeout)
                .await
            {
                Ok(result) => {
                    if let Some(data) = result.get("data").and_then(Value::as_str)
                        && !data.is_empty()
                    {
                        debug!(attempt = attempt + 1, "Screenshot captured");
                        return Some(format!("data:image/png;base64,{data}"));
                    }
                    warn!(
                        attempt = attempt + 1,
                        max_attempts, "Screenshot response contained no data"
                    );
                }
                Err(e) => {
                    warn!(
                        attempt = attempt + 1,
                        max_attempts,
                        error = %e,
                        "Screenshot capture failed"
                    );
                }
            }

            // No wait after the last attempt
            if attempt + 1 < max_attempts {
                tokio::time::sleep(self.options.backoff_delay(attempt)).await;
            }
        }

        warn!(attempts = max_attempts, "Screenshot capture exhausted retries");
        None
    }
}

// ============================================================================
// Tests
// ============================================================================
