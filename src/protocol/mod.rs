//! DevTools protocol message types.
//!
//! This module defines the JSON message format exchanged with the remote
//! debugging endpoint.
//!
//! # Protocol Overview
//!
//! | Message Type | Direction | Purpose |
//! |--------------|-----------|---------|
//! | [`CommandMessage`] | local → browser | Command with fresh request id |
//! | [`CommandResponse`] | browser → local | Correlated by `id` |
//! | [`ProtocolEvent`] | browser → local | Unsolicited notification |
//!
//! Commands follow the `Domain.methodName` format:
//!
//! - `Target.attachToTarget`
//! - `Page.captureScreenshot`
//! - `DOMSnapshot.captureSnapshot`
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `command` | Command definitions by protocol domain |
//! | `message` | Wire frames and the inbound tagged variant |

// ============================================================================
// Submodules
// ============================================================================

/// Command definitions organized by domain.
pub mod command;

/// Wire message frames and inbound classification.
pub mod message;

// ============================================================================
// Re-exports
// ============================================================================

pub use command::{ClipRegion, Command, DomCommand, PageCommand, RuntimeCommand, TargetCommand};
pub use message::{
    CommandError, CommandMessage, CommandResponse, IncomingMessage, ParsedEvent, ProtocolEvent,
    TargetInfo,
};
