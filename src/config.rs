//! Observer configuration options.
//!
//! Provides a type-safe interface for tuning capture behavior: retry
//! budgets, screencast encoding parameters, the bootstrap settle delay,
//! and trace dispatcher deadlines.
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use cdp_observe::ObserverConfig;
//!
//! let config = ObserverConfig::new()
//!     .with_bootstrap_url("https://example.com")
//!     .with_bootstrap_settle(Duration::from_secs(3));
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::path::PathBuf;
use std::time::Duration;

// ============================================================================
// ObserverConfig
// ============================================================================

/// Top-level observer configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObserverConfig {
    /// URL used to create a bootstrap target when the debugging endpoint
    /// exposes no attachable page.
    pub bootstrap_url: String,

    /// Grace period between creating the bootstrap target and re-scanning
    /// for attachable pages. Depends on browser startup latency.
    pub bootstrap_settle: Duration,

    /// Screenshot capture options.
    pub screenshot: ScreenshotOptions,

    /// Screencast recording options.
    pub screencast: ScreencastOptions,
}

impl Default for ObserverConfig {
    fn default() -> Self {
        Self {
            bootstrap_url: "https://www.google.com".to_string(),
            bootstrap_settle: Duration::from_secs(2),
            screenshot: ScreenshotOptions::default(),
            screencast: ScreencastOptions::default(),
        }
    }
}

impl ObserverConfig {
    /// Creates a configuration with default settings.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the bootstrap navigation URL.
    #[inline]
    #[must_use]
    pub fn with_bootstrap_url(mut self, url: impl Into<String>) -> Self {
        self.bootstrap_url = url.into();
        self
    }

    /// Sets the bootstrap settle delay.
    #[inline]
    #[must_use]
    pub fn with_bootstrap_settle(mut self, settle: Duration) -> Self {
        self.bootstrap_settle = settle;
        self
    }

    /// Sets the screenshot options.
    #[inline]
    #[must_use]
    pub fn with_screenshot(mut self, screenshot: ScreenshotOptions) -> Self {
        self.screenshot = screenshot;
        self
    }

    /// Sets the screencast options.
    #[inline]
    #[must_use]
    pub fn with_screencast(mut self, screencast: ScreencastOptions) -> Self {
        self.screencast = screencast;
        self
    }
}

// ============================================================================
// ScreenshotOptions
// ============================================================================

/// Retry and timeout budget for on-demand screenshot/DOM capture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScreenshotOptions {
    /// Timeout per capture attempt.
    pub attempt_timeout: Duration,

    /// Number of retries after the first attempt.
    pub retries: u32,

    /// Image quality (0-100) passed to the capture command.
    pub quality: u8,
}

impl Default for ScreenshotOptions {
    fn default() -> Self {
        Self {
            attempt_timeout: Duration::from_secs(2),
            retries: 2,
            quality: 60,
        }
    }
}

impl ScreenshotOptions {
    /// Total number of attempts (first attempt plus retries).
    #[inline]
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.retries + 1
    }

    /// Backoff delay before the retry following `attempt` (0-based).
    ///
    /// Schedule: 1s, 1.5s, 2s, ... capped at 3s.
    #[inline]
    #[must_use]
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let millis = (1000 + 500 * u64::from(attempt)).min(3000);
        Duration::from_millis(millis)
    }
}

// ============================================================================
// ScreencastOptions
// ============================================================================

/// Screencast stream and video assembly options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScreencastOptions {
    /// Frame image format requested from the browser ("png" or "jpeg").
    pub format: String,

    /// Frame compression quality (0-100).
    pub quality: u8,

    /// Capture every Nth frame (1 = every frame).
    pub every_nth_frame: u32,

    /// Frame rate of the assembled video.
    pub frame_rate: u32,

    /// Encoder binary invoked to assemble the video.
    pub encoder_binary: PathBuf,
}

impl Default for ScreencastOptions {
    fn default() -> Self {
        Self {
            format: "png".to_string(),
            quality: 60,
            every_nth_frame: 1,
            frame_rate: 15,
            encoder_binary: PathBuf::from("ffmpeg"),
        }
    }
}

impl ScreencastOptions {
    /// Sets the encoder binary path.
    #[inline]
    #[must_use]
    pub fn with_encoder_binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.encoder_binary = binary.into();
        self
    }

    /// Sets the assembled video frame rate.
    #[inline]
    #[must_use]
    pub fn with_frame_rate(mut self, frame_rate: u32) -> Self {
        self.frame_rate = frame_rate;
        self
    }
}

// ============================================================================
// DispatcherOptions
// ============================================================================

/// Timing budget for the trace dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatcherOptions {
    /// Total deadline for enriching one event with a screenshot and
    /// DOM snapshot before falling back to the bare event.
    pub enrichment_deadline: Duration,

    /// Bounded wait for the queue to drain on shutdown.
    pub drain_timeout: Duration,

    /// Maximum characters of DOM snapshot forwarded per trace.
    pub dom_truncate_limit: usize,
}

impl Default for DispatcherOptions {
    fn default() -> Self {
        Self {
            enrichment_deadline: Duration::from_secs(5),
            drain_timeout: Duration::from_secs(10),
            dom_truncate_limit: 10_000,
        }
    }
}

impl DispatcherOptions {
    /// Sets the enrichment deadline.
    #[inline]
    #[must_use]
    pub fn with_enrichment_deadline(mut self, deadline: Duration) -> Self {
        self.enrichment_deadline = deadline;
        self
    }

    /// Sets the shutdown drain timeout.
    #[inline]
    #[must_use]
    pub fn with_drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = timeout;
        self
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ObserverConfig::default();
        assert_eq!(config.bootstrap_settle, Duration::from_secs(2));
        assert_eq!(config.screenshot.retries, 2);
        assert_eq!(config.screenshot.attempt_timeout, Duration::from_secs(2));
        assert_eq!(config.screencast.frame_rate, 15);
        assert_eq!(config.screencast.every_nth_frame, 1);
    }

    #[test]
    fn test_backoff_schedule() {
        let opts = ScreenshotOptions::default();
        assert_eq!(opts.backoff_delay(0), Duration::from_millis(1000));
        assert_eq!(opts.backoff_delay(1), Duration::from_millis(1500));
        assert_eq!(opts.backoff_delay(2), Duration::from_millis(2000));
        // Capped at 3s regardless of attempt count
        assert_eq!(opts.backoff_delay(10), Duration::from_millis(3000));
    }

    #[test]
    fn test_max_attempts() {
        let opts = ScreenshotOptions::default();
        assert_eq!(opts.max_attempts(), 3);
    }

    #[test]
    fn test_builder_methods() {
        let config = ObserverConfig::new()
            .with_bootstrap_url("https://example.com")
            .with_bootstrap_settle(Duration::from_secs(5));
        assert_eq!(config.bootstrap_url, "https://example.com");
        assert_eq!(config.bootstrap_settle, Duration::from_secs(5));
    }

    #[test]
    fn test_dispatcher_defaults() {
        let opts = DispatcherOptions::default();
        assert_eq!(opts.enrichment_deadline, Duration::from_secs(5));
        assert_eq!(opts.drain_timeout, Duration::from_secs(10));
        assert_eq!(opts.dom_truncate_limit, 10_000);
    }
}
