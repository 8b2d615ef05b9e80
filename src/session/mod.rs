//! Session management.
//!
//! Tracks which page targets are attached and which protocol domains
//! have been enabled on each resulting session.

// ============================================================================
// Submodules
// ============================================================================

/// Target discovery and session registry.
pub mod registry;

// ============================================================================
// Re-exports
// ============================================================================

pub use registry::{PageSession, SessionRegistry};
