//! Command definitions organized by protocol domain.
//!
//! Commands follow the DevTools `Domain.methodName` format.
//!
//! # Command Domains
//!
//! | Domain | Commands |
//! |--------|----------|
//! | `Target` | Discovery, attachment, target creation |
//! | `Page` | Screenshot, layout metrics, screencast control |
//! | `DOM` / `DOMSnapshot` | Structured DOM capture |
//! | `Runtime` | Domain enablement for script context events |

// ============================================================================
// Imports
// ============================================================================

use serde::Serialize;

use crate::identifiers::TargetId;

// ============================================================================
// Command Wrapper
// ============================================================================

/// All protocol commands organized by domain.
///
/// This enum wraps domain-specific command enums for unified serialization.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Command {
    /// Target domain commands.
    Target(TargetCommand),
    /// Page domain commands.
    Page(PageCommand),
    /// DOM and DOMSnapshot domain commands.
    Dom(DomCommand),
    /// Runtime domain commands.
    Runtime(RuntimeCommand),
}

impl Command {
    /// Returns the `Domain.methodName` string for this command.
    ///
    /// Used for logging and timeout diagnostics.
    #[must_use]
    pub fn method(&self) -> &'static str {
        match self {
            Self::Target(cmd) => cmd.method(),
            Self::Page(cmd) => cmd.method(),
            Self::Dom(cmd) => cmd.method(),
            Self::Runtime(cmd) => cmd.method(),
        }
    }
}

impl From<TargetCommand> for Command {
    fn from(cmd: TargetCommand) -> Self {
        Self::Target(cmd)
    }
}

impl From<PageCommand> for Command {
    fn from(cmd: PageCommand) -> Self {
        Self::Page(cmd)
    }
}

impl From<DomCommand> for Command {
    fn from(cmd: DomCommand) -> Self {
        Self::Dom(cmd)
    }
}

impl From<RuntimeCommand> for Command {
    fn from(cmd: RuntimeCommand) -> Self {
        Self::Runtime(cmd)
    }
}

// ============================================================================
// Target Commands
// ============================================================================

/// Target domain commands for discovery and attachment.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "method", content = "params")]
pub enum TargetCommand {
    /// Enumerate all targets known to the browser.
    #[serde(rename = "Target.getTargets")]
    GetTargets,

    /// Attach to a target, producing a session.
    #[serde(rename = "Target.attachToTarget")]
    AttachToTarget {
        /// Target to attach to.
        #[serde(rename = "targetId")]
        target_id: TargetId,
        /// Use flat session addressing (sessionId on each message).
        flatten: bool,
    },

    /// Enable target discovery notifications.
    #[serde(rename = "Target.setDiscoverTargets")]
    SetDiscoverTargets {
        /// Whether to discover targets.
        discover: bool,
    },

    /// Create a new target by navigating to a URL.
    #[serde(rename = "Target.createTarget")]
    CreateTarget {
        /// Initial URL for the new target.
        url: String,
    },
}

impl TargetCommand {
    /// Returns the `Domain.methodName` string.
    #[must_use]
    pub fn method(&self) -> &'static str {
        match self {
            Self::GetTargets => "Target.getTargets",
            Self::AttachToTarget { .. } => "Target.attachToTarget",
            Self::SetDiscoverTargets { .. } => "Target.setDiscoverTargets",
            Self::CreateTarget { .. } => "Target.createTarget",
        }
    }

    /// Creates a flat-mode attach command.
    #[inline]
    #[must_use]
    pub fn attach(target_id: TargetId) -> Self {
        Self::AttachToTarget {
            target_id,
            flatten: true,
        }
    }
}

// ============================================================================
// Page Commands
// ============================================================================

/// Page domain commands for capture and screencast control.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "method", content = "params")]
pub enum PageCommand {
    /// Enable the Page domain on a session.
    #[serde(rename = "Page.enable")]
    Enable,

    /// Capture a single screenshot of the visible viewport.
    #[serde(rename = "Page.captureScreenshot")]
    CaptureScreenshot {
        /// Image format ("png" or "jpeg").
        format: String,
        /// Compression quality (0-100).
        quality: u8,
        /// Optional clip region for element-scoped capture.
        #[serde(skip_serializing_if = "Option::is_none")]
        clip: Option<ClipRegion>,
    },

    /// Query viewport layout metrics.
    #[serde(rename = "Page.getLayoutMetrics")]
    GetLayoutMetrics,

    /// Start streaming screencast frames.
    #[serde(rename = "Page.startScreencast")]
    StartScreencast {
        /// Frame image format.
        format: String,
        /// Frame compression quality (0-100).
        quality: u8,
        /// Capture every Nth frame.
        #[serde(rename = "everyNthFrame")]
        every_nth_frame: u32,
        /// Maximum frame width.
        #[serde(rename = "maxWidth", skip_serializing_if = "Option::is_none")]
        max_width: Option<u32>,
        /// Maximum frame height.
        #[serde(rename = "maxHeight", skip_serializing_if = "Option::is_none")]
        max_height: Option<u32>,
    },

    /// Stop streaming screencast frames.
    #[serde(rename = "Page.stopScreencast")]
    StopScreencast,

    /// Acknowledge a received screencast frame.
    ///
    /// The stream stalls until each frame is acknowledged.
    #[serde(rename = "Page.screencastFrameAck")]
    ScreencastFrameAck {
        /// Frame session number from the frame event.
        #[serde(rename = "sessionId")]
        session_id: u64,
    },
}

impl PageCommand {
    /// Returns the `Domain.methodName` string.
    #[must_use]
    pub fn method(&self) -> &'static str {
        match self {
            Self::Enable => "Page.enable",
            Self::CaptureScreenshot { .. } => "Page.captureScreenshot",
            Self::GetLayoutMetrics => "Page.getLayoutMetrics",
            Self::StartScreencast { .. } => "Page.startScreencast",
            Self::StopScreencast => "Page.stopScreencast",
            Self::ScreencastFrameAck { .. } => "Page.screencastFrameAck",
        }
    }
}

// ============================================================================
// ClipRegion
// ============================================================================

/// Viewport clip region for element-scoped screenshots.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ClipRegion {
    /// X offset in CSS pixels.
    pub x: f64,
    /// Y offset in CSS pixels.
    pub y: f64,
    /// Width in CSS pixels.
    pub width: f64,
    /// Height in CSS pixels.
    pub height: f64,
    /// Page scale factor.
    pub scale: f64,
}

impl ClipRegion {
    /// Creates a clip region at unit scale.
    #[inline]
    #[must_use]
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
            scale: 1.0,
        }
    }
}

// ============================================================================
// DOM Commands
// ============================================================================

/// DOM and DOMSnapshot domain commands.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "method", content = "params")]
pub enum DomCommand {
    /// Enable the DOM domain on a session.
    #[serde(rename = "DOM.enable")]
    Enable,

    /// Enable the DOMSnapshot domain on a session.
    #[serde(rename = "DOMSnapshot.enable")]
    SnapshotEnable,

    /// Capture a structured snapshot of the document.
    #[serde(rename = "DOMSnapshot.captureSnapshot")]
    CaptureSnapshot {
        /// Computed style properties to include per node.
        #[serde(rename = "computedStyles")]
        computed_styles: Vec<String>,
    },
}

impl DomCommand {
    /// Returns the `Domain.methodName` string.
    #[must_use]
    pub fn method(&self) -> &'static str {
        match self {
            Self::Enable => "DOM.enable",
            Self::SnapshotEnable => "DOMSnapshot.enable",
            Self::CaptureSnapshot { .. } => "DOMSnapshot.captureSnapshot",
        }
    }
}

// ============================================================================
// Runtime Commands
// ============================================================================

/// Runtime domain commands.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "method", content = "params")]
pub enum RuntimeCommand {
    /// Enable the Runtime domain on a session.
    #[serde(rename = "Runtime.enable")]
    Enable,
}

impl RuntimeCommand {
    /// Returns the `Domain.methodName` string.
    #[must_use]
    pub fn method(&self) -> &'static str {
        match self {
            Self::Enable => "Runtime.enable",
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
