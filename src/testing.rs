//! Test support: a scriptable in-memory command transport.
//!
//! Lets unit tests drive the registry, capture utilities and screencast
//! pipeline against programmed responses without a browser.

// ============================================================================
// Imports
// ============================================================================

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::Value;

use crate::backend::{BackendClient, MediaType};
use crate::error::{Error, Result};
use crate::identifiers::SessionId;
use crate::protocol::Command;
use crate::trace::TraceKind;
use crate::transport::CommandTransport;

// ============================================================================
// Tracing Setup
// ============================================================================

/// Installs a tracing subscriber writing to the test harness output.
///
/// Honors `RUST_LOG`; repeated calls are no-ops so any test can invoke
/// it first.
pub(crate) fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// ============================================================================
// MockTransport
// ============================================================================

/// One command observed by the mock.
#[derive(Debug, Clone)]
pub(crate) struct RecordedCall {
    /// `Domain.methodName` of the command.
    pub method: String,
    /// Session scope, if any.
    pub session_id: Option<SessionId>,
    /// Serialized command (method + params).
    pub body: Value,
    /// Whether the command was posted (no response awaited).
    pub posted: bool,
}

/// Programmed reply for one invocation of a method.
pub(crate) enum MockReply {
    /// Respond with a value.
    Value(Value),
    /// Respond with a command error.
    Fail(String),
    /// Never respond; the caller's timeout elapses.
    Hang,
}

/// Scriptable transport recording every command it receives.
///
/// Replies are queued per method; once a queue is exhausted further
/// calls get `Value::Null`.
#[derive(Default)]
pub(crate) struct MockTransport {
    calls: Mutex<Vec<RecordedCall>>,
    replies: Mutex<FxHashMap<String, VecDeque<MockReply>>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a reply for the next invocation of `method`.
    pub fn enqueue(&self, method: &str, reply: MockReply) {
        self.replies
            .lock()
            .entry(method.to_string())
            .or_default()
            .push_back(reply);
    }

    /// Queues a successful value reply.
    pub fn respond(&self, method: &str, value: Value) {
        self.enqueue(method, MockReply::Value(value));
    }

    /// Returns all recorded calls.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }

    /// Returns recorded calls for one method.
    pub fn calls_for(&self, method: &str) -> Vec<RecordedCall> {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.method == method)
            .cloned()
            .collect()
    }

    fn record(&self, command: &Command, session_id: Option<&SessionId>, posted: bool) -> String {
        let method = command.method().to_string();
        self.calls.lock().push(RecordedCall {
            method: method.clone(),
            session_id: session_id.cloned(),
            body: serde_json::to_value(command).expect("serialize command"),
            posted,
        });
        method
    }
}

#[async_trait::async_trait]
impl CommandTransport for MockTransport {
    async fn send(
        &self,
        command: Command,
        session_id: Option<&SessionId>,
        request_timeout: Duration,
    ) -> Result<Value> {
        let method = self.record(&command, session_id, false);

        let reply = self.replies.lock().get_mut(&method).and_then(VecDeque::pop_front);
        match reply {
            Some(MockReply::Value(value)) => Ok(value),
            Some(MockReply::Fail(message)) => Err(Error::command(-32000, message)),
            Some(MockReply::Hang) => {
                tokio::time::sleep(request_timeout).await;
                Err(Error::request_timeout(
                    crate::identifiers::RequestId::new(0),
                    request_timeout.as_millis() as u64,
                ))
            }
            None => Ok(Value::Null),
        }
    }

    async fn post(&self, command: Command, session_id: Option<&SessionId>) -> Result<()> {
        self.record(&command, session_id, true);
        Ok(())
    }
}

// ============================================================================
// RecordingBackend
// ============================================================================

/// One backend operation observed by [`RecordingBackend`].
#[derive(Debug, Clone)]
pub(crate) enum BackendOp {
    SessionCreated(String),
    Trace(TraceKind, String),
    Media(MediaType, String),
    SessionUpdated,
    SessionEnded,
    Closed,
}

/// Backend double recording every call in order.
pub(crate) struct RecordingBackend {
    session: AtomicBool,
    fail_next_trace: AtomicBool,
    ops: Mutex<Vec<BackendOp>>,
}

impl RecordingBackend {
    pub fn new(has_session: bool) -> Self {
        Self {
            session: AtomicBool::new(has_session),
            fail_next_trace: AtomicBool::new(false),
            ops: Mutex::new(Vec::new()),
        }
    }

    /// Makes the next `create_trace` call fail.
    pub fn fail_next_trace(&self) {
        self.fail_next_trace.store(true, Ordering::SeqCst);
    }

    /// Returns every recorded operation in call order.
    pub fn ops(&self) -> Vec<BackendOp> {
        self.ops.lock().clone()
    }
}

#[async_trait::async_trait]
impl BackendClient for RecordingBackend {
    async fn create_session(&self, prompt: &str, _model: &str, _params: Value) -> Result<()> {
        self.session.store(true, Ordering::SeqCst);
        self.ops.lock().push(BackendOp::SessionCreated(prompt.to_string()));
        Ok(())
    }

    fn has_session(&self) -> bool {
        self.session.load(Ordering::SeqCst)
    }

    async fn create_trace(&self, kind: TraceKind, content: &str) -> Result<()> {
        if self.fail_next_trace.swap(false, Ordering::SeqCst) {
            return Err(Error::connection("backend unavailable"));
        }
        self.ops.lock().push(BackendOp::Trace(kind, content.to_string()));
        Ok(())
    }

    async fn upload_media(&self, media_type: MediaType, data: &str) -> Result<()> {
        self.ops.lock().push(BackendOp::Media(media_type, data.to_string()));
        Ok(())
    }

    async fn update_session(
        &self,
        _evaluation: Option<Value>,
        _result: Option<String>,
    ) -> Result<()> {
        self.ops.lock().push(BackendOp::SessionUpdated);
        Ok(())
    }

    async fn end_session(&self) -> Result<()> {
        self.session.store(false, Ordering::SeqCst);
        self.ops.lock().push(BackendOp::SessionEnded);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.ops.lock().push(BackendOp::Closed);
        Ok(())
    }
}
