//! On-demand structured DOM snapshot capture.
//!
//! Mirrors the screenshot capture request/response shape: per-attempt
//! timeout, bounded retry with the same backoff schedule, and an empty
//! result sentinel instead of an error.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use tracing::{debug, warn};

use crate::config::ScreenshotOptions;
use crate::identifiers::SessionId;
use crate::protocol::DomCommand;
use crate::transport::CommandTransport;

// ============================================================================
// DomCapture
// ============================================================================

/// Captures structured DOM snapshots from attached pages.
pub struct DomCapture {
    transport: Arc<dyn CommandTransport>,
    options: ScreenshotOptions,
}

impl DomCapture {
    /// Creates a capture utility over the given transport.
    #[must_use]
    pub fn new(transport: Arc<dyn CommandTransport>, options: ScreenshotOptions) -> Self {
        Self { transport, options }
    }

    /// Captures a DOM snapshot rendered as a JSON string.
    ///
    /// Returns an empty string if every attempt failed or timed out.
    pub async fn capture(&self, session_id: Option<&SessionId>) -> String {
        let max_attempts = self.options.max_attempts();

        for attempt in 0..max_attempts {
            let command = DomCommand::CaptureSnapshot {
                computed_styles: Vec::new(),
            };

            match self
                .transport
                .send(command.into(), session_id, self.options.attempt_timeout)
                .await
            {
                Ok(result) if !result.is_null() => {
                    debug!(attempt = attempt + 1, "DOM snapshot captured");
                    return result.to_string();
                }
                Ok(_) => {
                    warn!(
                        attempt = attempt + 1,
                        max_attempts, "DOM snapshot response was empty"
                    );
                }
                Err(e) => {
                    warn!(
                        attempt = attempt + 1,
                        max_attempts,
                        error = %e,
                        "DOM snapshot capture failed"
                    );
                }
            }

            if attempt + 1 < max_attempts {
                tokio::time::sleep(self.options.backoff_delay(attempt)).await;
            }
        }

        warn!(attempts = max_attempts, "DOM snapshot capture exhausted retries");
        String::new()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockReply, MockTransport};
    use serde_json::json;

    #[tokio::test]
    async fn test_snapshot_rendered_as_string() {
        let transport = Arc::new(MockTransport::new());
        transport.respond(
            "DOMSnapshot.captureSnapshot",
            json!({"documents": [], "strings": ["a"]}),
        );

        let capture = DomCapture::new(transport.clone(), ScreenshotOptions::default());
        let result = capture.capture(Some(&SessionId::from("S1"))).await;

        assert!(result.contains("\"strings\""));
        let calls = transport.calls_for("DOMSnapshot.captureSnapshot");
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].session_id, Some(SessionId::from("S1")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_resolves_to_empty_string() {
        let transport = Arc::new(MockTransport::new());
        for _ in 0..3 {
            transport.enqueue("DOMSnapshot.captureSnapshot", MockReply::Fail("detached".into()));
        }

        let capture = DomCapture::new(transport.clone(), ScreenshotOptions::default());
        let result = capture.capture(None).await;

        assert!(result.is_empty());
        assert_eq!(transport.calls_for("DOMSnapshot.captureSnapshot").len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_after_null_response() {
        let transport = Arc::new(MockTransport::new());
        transport.respond("DOMSnapshot.captureSnapshot", json!(null));
        transport.respond("DOMSnapshot.captureSnapshot", json!({"documents": []}));

        let capture = DomCapture::new(transport.clone(), ScreenshotOptions::default());
        let result = capture.capture(None).await;

        assert!(result.contains("documents"));
        assert_eq!(transport.calls_for("DOMSnapshot.captureSnapshot").len(), 2);
    }
}
