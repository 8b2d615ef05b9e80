//! Trace event model.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

// ============================================================================
// TraceKind
// ============================================================================

/// Category of a trace recorded against a backend session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TraceKind {
    /// Agent reasoning step.
    Thought,
    /// Agent action about to be executed.
    Action,
    /// Evaluation of the previous step's outcome.
    Eval,
    /// Tool invocation or result.
    Tool,
    /// Final answer of the run.
    Final,
    /// Captured DOM snapshot attached to another trace.
    Dom,
}

impl TraceKind {
    /// Wire label for the trace kind.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Thought => "thought",
            Self::Action => "action",
            Self::Eval => "eval",
            Self::Tool => "tool",
            Self::Final => "final",
            Self::Dom => "dom",
        }
    }
}

impl fmt::Display for TraceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// TraceEvent
// ============================================================================

/// One queued trace awaiting dispatch to the backend.
#[derive(Debug, Clone)]
pub struct TraceEvent {
    /// Category of the trace.
    pub kind: TraceKind,
    /// Trace payload.
    pub content: String,
    /// Whether the dispatcher should attach a screenshot and DOM snapshot.
    pub needs_enrichment: bool,
    /// Wall-clock time the event was produced.
    pub captured_at: SystemTime,
}

impl TraceEvent {
    /// Creates a plain trace event.
    #[must_use]
    pub fn new(kind: TraceKind, content: impl Into<String>) -> Self {
        Self {
            kind,
            content: content.into(),
            needs_enrichment: false,
            captured_at: SystemTime::now(),
        }
    }

    /// Creates a trace event that requests screenshot/DOM enrichment.
    #[must_use]
    pub fn enriched(kind: TraceKind, content: impl Into<String>) -> Self {
        Self {
            needs_enrichment: true,
            ..Self::new(kind, content)
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_labels() {
        assert_eq!(TraceKind::Thought.as_str(), "thought");
        assert_eq!(TraceKind::Dom.to_string(), "dom");
    }

    #[test]
    fn test_kind_serde_lowercase() {
        let json = serde_json::to_string(&TraceKind::Final).expect("serialize");
        assert_eq!(json, "\"final\"");
        let back: TraceKind = serde_json::from_str("\"action\"").expect("deserialize");
        assert_eq!(back, TraceKind::Action);
    }

    #[test]
    fn test_enriched_constructor() {
        let event = TraceEvent::enriched(TraceKind::Tool, "clicked #submit");
        assert!(event.needs_enrichment);
        assert_eq!(event.kind, TraceKind::Tool);
        assert!(!TraceEvent::new(TraceKind::Thought, "x").needs_enrichment);
    }
}
