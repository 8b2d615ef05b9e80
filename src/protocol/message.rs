//! Wire message types.
//!
//! Defines the JSON message format exchanged with the debugging endpoint
//! and the tagged variant inbound messages are decoded into before dispatch.
//!
//! # Message Shapes
//!
//! | Shape | Direction | Discriminant |
//! |-------|-----------|--------------|
//! | command | local → browser | has `id` and `method` |
//! | response | browser → local | has `id`, no `method` |
//! | event | browser → local | has `method`, no `id` |
//!
//! Responses carry either `result` or `error`; events carry `params`.
//! Messages scoped to an attached page carry `sessionId`.

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::identifiers::{RequestId, SessionId, TargetId};

use super::Command;

// ============================================================================
// CommandMessage
// ============================================================================

/// An outgoing command frame.
///
/// # Format
///
/// ```json
/// {
///   "id": 7,
///   "method": "Page.captureScreenshot",
///   "params": { ... },
///   "sessionId": "ABC123"
/// }
/// ```
#[derive(Debug, Clone, Serialize)]
pub struct CommandMessage {
    /// Identifier for request/response correlation.
    pub id: RequestId,

    /// Command with method and params.
    #[serde(flatten)]
    pub command: Command,

    /// Session scope; absent for browser-level commands.
    #[serde(rename = "sessionId", skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,
}

impl CommandMessage {
    /// Creates a command frame.
    #[inline]
    #[must_use]
    pub fn new(id: RequestId, command: Command, session_id: Option<SessionId>) -> Self {
        Self {
            id,
            command,
            session_id,
        }
    }
}

// ============================================================================
// IncomingMessage
// ============================================================================

/// An inbound message, decoded into a tagged variant before dispatch.
///
/// Discriminated by the presence of an `id` (response) versus a
/// `method` without `id` (event).
#[derive(Debug, Clone)]
pub enum IncomingMessage {
    /// A response correlated to an in-flight command.
    Response(CommandResponse),
    /// An unsolicited event.
    Event(ProtocolEvent),
}

impl IncomingMessage {
    /// Parses a raw JSON text frame into a tagged message.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] if the frame is neither a response
    /// nor an event, or [`Error::Json`] if it is not valid JSON.
    pub fn parse(text: &str) -> Result<Self> {
        let wire: WireMessage = serde_json::from_str(text)?;

        match (wire.id, wire.method) {
            (Some(id), _) => Ok(Self::Response(CommandResponse {
                id,
                result: wire.result,
                error: wire.error,
                session_id: wire.session_id,
            })),
            (None, Some(method)) => Ok(Self::Event(ProtocolEvent {
                method,
                params: wire.params.unwrap_or(Value::Null),
                session_id: wire.session_id,
            })),
            (None, None) => Err(Error::protocol("message has neither id nor method")),
        }
    }
}

/// Raw inbound frame, before classification.
#[derive(Debug, Deserialize)]
struct WireMessage {
    #[serde(default)]
    id: Option<RequestId>,
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    params: Option<Value>,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<CommandError>,
    #[serde(default, rename = "sessionId")]
    session_id: Option<SessionId>,
}

// ============================================================================
// CommandResponse
// ============================================================================

/// A response correlated to a command by id.
#[derive(Debug, Clone)]
pub struct CommandResponse {
    /// Matches the command `id`.
    pub id: RequestId,

    /// Result data (if success).
    pub result: Option<Value>,

    /// Error object (if the command was rejected).
    pub error: Option<CommandError>,

    /// Session the response is scoped to.
    pub session_id: Option<SessionId>,
}

impl CommandResponse {
    /// Extracts the result value, converting a protocol error object
    /// into [`Error::Command`].
    pub fn into_result(self) -> Result<Value> {
        match self.error {
            Some(err) => Err(Error::command(err.code, err.message)),
            None => Ok(self.result.unwrap_or(Value::Null)),
        }
    }
}

/// Error object carried by a rejected command response.
#[derive(Debug, Clone, Deserialize)]
pub struct CommandError {
    /// Protocol error code.
    pub code: i64,
    /// Protocol error message.
    pub message: String,
}

// ============================================================================
// ProtocolEvent
// ============================================================================

/// An unsolicited event from the browser.
#[derive(Debug, Clone)]
pub struct ProtocolEvent {
    /// Event name in `Domain.eventName` format.
    pub method: String,

    /// Event-specific data.
    pub params: Value,

    /// Session the event originated from.
    pub session_id: Option<SessionId>,
}

impl ProtocolEvent {
    /// Returns the domain name from the method.
    #[inline]
    #[must_use]
    pub fn domain(&self) -> &str {
        self.method.split('.').next().unwrap_or_default()
    }

    /// Parses the event into a typed variant.
    #[must_use]
    pub fn parse(&self) -> ParsedEvent {
        match self.method.as_str() {
            "Page.screencastFrame" => ParsedEvent::ScreencastFrame {
                data: self.get_string("data"),
                metadata: self.params.get("metadata").cloned().unwrap_or(Value::Null),
                ack_id: self
                    .params
                    .get("sessionId")
                    .and_then(|v| v.as_u64())
                    .unwrap_or_default(),
            },

            "Target.targetCreated" => {
                match self
                    .params
                    .get("targetInfo")
                    .cloned()
                    .map(serde_json::from_value::<TargetInfo>)
                {
                    Some(Ok(target)) => ParsedEvent::TargetCreated { target },
                    _ => ParsedEvent::Unknown {
                        method: self.method.clone(),
                    },
                }
            }

            "Target.targetDestroyed" => ParsedEvent::TargetDestroyed {
                target_id: TargetId::new(self.get_string("targetId")),
            },

            "Target.detachedFromTarget" => ParsedEvent::DetachedFromTarget {
                session_id: SessionId::new(self.get_string("sessionId")),
            },

            _ => ParsedEvent::Unknown {
                method: self.method.clone(),
            },
        }
    }

    /// Gets a string from params.
    #[inline]
    fn get_string(&self, key: &str) -> String {
        self.params
            .get(key)
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string()
    }
}

// ============================================================================
// ParsedEvent
// ============================================================================

/// Parsed event types for type-safe handling.
#[derive(Debug, Clone)]
pub enum ParsedEvent {
    /// A screencast frame was delivered.
    ///
    /// Must be acknowledged with `ack_id` to keep the stream flowing.
    ScreencastFrame {
        /// Base64-encoded frame image.
        data: String,
        /// Frame metadata (viewport, scroll offsets, timestamp).
        metadata: Value,
        /// Frame session number to echo in the acknowledgment.
        ack_id: u64,
    },

    /// A new target was created.
    TargetCreated {
        /// Info about the created target.
        target: TargetInfo,
    },

    /// A target was destroyed.
    TargetDestroyed {
        /// The destroyed target.
        target_id: TargetId,
    },

    /// A session was detached from its target.
    DetachedFromTarget {
        /// The detached session.
        session_id: SessionId,
    },

    /// Unhandled event type.
    Unknown {
        /// Event method.
        method: String,
    },
}

// ============================================================================
// TargetInfo
// ============================================================================

/// Description of a browsable target.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetInfo {
    /// Target identifier.
    pub target_id: TargetId,

    /// Target type; only "page" targets are attached.
    #[serde(rename = "type")]
    pub target_type: String,

    /// Current URL.
    #[serde(default)]
    pub url: String,

    /// Page title.
    #[serde(default)]
    pub title: String,

    /// Whether a client is already attached.
    #[serde(default)]
    pub attached: bool,
}

impl TargetInfo {
    /// Returns `true` if this is a page target.
    #[inline]
    #[must_use]
    pub fn is_page(&self) -> bool {
        self.target_type == "page"
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::PageCommand;

    #[test]
    fn test_command_message_serialization() {
        let msg = CommandMessage::new(
            RequestId::new(3),
            Command::Page(PageCommand::GetLayoutMetrics),
            Some(SessionId::from("S1")),
        );
        let json = serde_json::to_value(&msg).expect("serialize");

        assert_eq!(json["id"], 3);
        assert_eq!(json["method"], "Page.getLayoutMetrics");
        assert_eq!(json["sessionId"], "S1");
    }

    #[test]
    fn test_session_id_omitted_for_browser_commands() {
        let msg = CommandMessage::new(
            RequestId::new(1),
            Command::Target(crate::protocol::TargetCommand::GetTargets),
            None,
        );
        let json = serde_json::to_value(&msg).expect("serialize");
        assert!(json.get("sessionId").is_none());
    }

    #[test]
    fn test_parse_success_response() {
        let text = r#"{"id": 5, "result": {"data": "iVBOR"}, "sessionId": "S1"}"#;
        let msg = IncomingMessage::parse(text).expect("parse");

        match msg {
            IncomingMessage::Response(resp) => {
                assert_eq!(resp.id, RequestId::new(5));
                let value = resp.into_result().expect("success");
                assert_eq!(value["data"], "iVBOR");
            }
            IncomingMessage::Event(_) => panic!("expected response"),
        }
    }

    #[test]
    fn test_parse_error_response() {
        let text = r#"{"id": 9, "error": {"code": -32000, "message": "Not attached"}}"#;
        let msg = IncomingMessage::parse(text).expect("parse");

        match msg {
            IncomingMessage::Response(resp) => {
                let err = resp.into_result().unwrap_err();
                assert!(matches!(err, Error::Command { code: -32000, .. }));
            }
            IncomingMessage::Event(_) => panic!("expected response"),
        }
    }

    #[test]
    fn test_parse_event() {
        let text = r#"{
            "method": "Page.screencastFrame",
            "params": {"data": "AAAA", "metadata": {"timestamp": 1.5}, "sessionId": 12},
            "sessionId": "S1"
        }"#;
        let msg = IncomingMessage::parse(text).expect("parse");

        match msg {
            IncomingMessage::Event(event) => {
                assert_eq!(event.domain(), "Page");
                match event.parse() {
                    ParsedEvent::ScreencastFrame { data, ack_id, .. } => {
                        assert_eq!(data, "AAAA");
                        assert_eq!(ack_id, 12);
                    }
                    other => panic!("unexpected parsed event: {other:?}"),
                }
            }
            IncomingMessage::Response(_) => panic!("expected event"),
        }
    }

    #[test]
    fn test_parse_target_created() {
        let text = r#"{
            "method": "Target.targetCreated",
            "params": {"targetInfo": {
                "targetId": "T9", "type": "page",
                "url": "https://example.com", "title": "Example", "attached": false
            }}
        }"#;
        let msg = IncomingMessage::parse(text).expect("parse");

        let IncomingMessage::Event(event) = msg else {
            panic!("expected event");
        };
        match event.parse() {
            ParsedEvent::TargetCreated { target } => {
                assert_eq!(target.target_id, TargetId::from("T9"));
                assert!(target.is_page());
                assert!(!target.attached);
            }
            other => panic!("unexpected parsed event: {other:?}"),
        }
    }

    #[test]
    fn test_parse_detached_from_target() {
        let text = r#"{
            "method": "Target.detachedFromTarget",
            "params": {"sessionId": "S7"}
        }"#;
        let IncomingMessage::Event(event) = IncomingMessage::parse(text).expect("parse") else {
            panic!("expected event");
        };
        match event.parse() {
            ParsedEvent::DetachedFromTarget { session_id } => {
                assert_eq!(session_id, SessionId::from("S7"));
            }
            other => panic!("unexpected parsed event: {other:?}"),
        }
    }

    #[test]
    fn test_parse_rejects_shapeless_message() {
        let err = IncomingMessage::parse(r#"{"params": {}}"#).unwrap_err();
        assert!(matches!(err, Error::Protocol { .. }));
    }

    #[test]
    fn test_unknown_event() {
        let text = r#"{"method": "Network.requestWillBeSent", "params": {}}"#;
        let IncomingMessage::Event(event) = IncomingMessage::parse(text).expect("parse") else {
            panic!("expected event");
        };
        assert!(matches!(event.parse(), ParsedEvent::Unknown { .. }));
    }
}
