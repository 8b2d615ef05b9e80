//! Target discovery and session management.
//!
//! The registry tracks the target→session binding for every attached
//! page. It discovers page targets, attaches to them with flat session
//! addressing, and enables the protocol domains required for capture.
//!
//! # Invariants
//!
//! - The target↔session mapping is a bijection at any instant.
//! - Sessions are created only in response to a successful attach.
//! - A session is removed as soon as its target detaches or is destroyed.

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::identifiers::{SessionId, TargetId};
use crate::protocol::{Command, DomCommand, PageCommand, RuntimeCommand, TargetCommand, TargetInfo};
use crate::transport::{CommandTransport, DEFAULT_COMMAND_TIMEOUT};

use std::sync::Arc;

// ============================================================================
// Constants
// ============================================================================

/// Domains enabled on every attached session, in order.
///
/// Page for screenshot/screencast, DOM + DOMSnapshot for structured
/// captures, Runtime for execution context events.
const REQUIRED_DOMAINS: [&str; 4] = ["Page.enable", "DOM.enable", "DOMSnapshot.enable", "Runtime.enable"];

/// Builds the enable command for a domain name.
fn enable_command(domain: &str) -> Command {
    match domain {
        "Page.enable" => PageCommand::Enable.into(),
        "DOM.enable" => DomCommand::Enable.into(),
        "DOMSnapshot.enable" => DomCommand::SnapshotEnable.into(),
        "Runtime.enable" => RuntimeCommand::Enable.into(),
        other => unreachable!("unknown domain {other}"),
    }
}

// ============================================================================
// PageSession
// ============================================================================

/// A protocol session bound 1:1 to an attached page target.
#[derive(Debug, Clone)]
pub struct PageSession {
    /// The session identifier used to scope commands.
    pub session_id: SessionId,
    /// Domains already enabled on this session.
    enabled_domains: Vec<&'static str>,
}

impl PageSession {
    fn new(session_id: SessionId) -> Self {
        Self {
            session_id,
            enabled_domains: Vec::new(),
        }
    }

    /// Returns `true` if the domain has been enabled on this session.
    #[inline]
    #[must_use]
    pub fn is_enabled(&self, domain: &str) -> bool {
        self.enabled_domains.contains(&domain)
    }
}

// ============================================================================
// SessionRegistry
// ============================================================================

/// Tracks target→session bindings and drives attachment.
pub struct SessionRegistry {
    /// Transport for issuing attach and enable commands.
    transport: Arc<dyn CommandTransport>,
    /// URL used to create a bootstrap target when no page exists.
    bootstrap_url: String,
    /// Grace period before re-scanning after bootstrap creation.
    bootstrap_settle: Duration,
    /// Attached sessions keyed by target.
    sessions: Mutex<FxHashMap<TargetId, PageSession>>,
}

impl SessionRegistry {
    /// Creates a registry over the given transport.
    #[must_use]
    pub fn new(
        transport: Arc<dyn CommandTransport>,
        bootstrap_url: impl Into<String>,
        bootstrap_settle: Duration,
    ) -> Self {
        Self {
            transport,
            bootstrap_url: bootstrap_url.into(),
            bootstrap_settle,
            sessions: Mutex::new(FxHashMap::default()),
        }
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// Returns the number of attached sessions.
    #[inline]
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.sessions.lock().len()
    }

    /// Returns all attached session ids.
    #[must_use]
    pub fn session_ids(&self) -> Vec<SessionId> {
        self.sessions
            .lock()
            .values()
            .map(|s| s.session_id.clone())
            .collect()
    }

    /// Returns any attached session id, if one exists.
    ///
    /// Capture surfaces use this when the caller does not name a session.
    #[must_use]
    pub fn first_session(&self) -> Option<SessionId> {
        self.sessions
            .lock()
            .values()
            .next()
            .map(|s| s.session_id.clone())
    }

    /// Returns the session bound to a target, if attached.
    #[must_use]
    pub fn session_for_target(&self, target_id: &TargetId) -> Option<SessionId> {
        self.sessions
            .lock()
            .get(target_id)
            .map(|s| s.session_id.clone())
    }

    // ========================================================================
    // Attachment
    // ========================================================================

    /// Attaches to every page target currently known to the browser.
    ///
    /// If zero sessions exist afterwards (fresh browser with no open
    /// pages), creates a bootstrap target, waits the configured settle
    /// period for the browser to register it, and re-scans.
    ///
    /// # Errors
    ///
    /// Returns transport errors from target enumeration; individual
    /// attach failures are logged and skipped.
    pub async fn attach_to_all_page_targets(&self) -> Result<()> {
        self.scan_and_attach().await?;

        if self.session_count() == 0 {
            info!(
                url = %self.bootstrap_url,
                "No attachable pages; creating bootstrap target"
            );

            self.transport
                .send(
                    TargetCommand::SetDiscoverTargets { discover: true }.into(),
                    None,
                    DEFAULT_COMMAND_TIMEOUT,
                )
                .await?;

            // Result unused; the re-scan below picks the target up
            self.transport
                .post(
                    TargetCommand::CreateTarget {
                        url: self.bootstrap_url.clone(),
                    }
                    .into(),
                    None,
                )
                .await?;

            tokio::time::sleep(self.bootstrap_settle).await;
            self.scan_and_attach().await?;
        }

        debug!(sessions = self.session_count(), "Target attachment complete");
        Ok(())
    }

    /// Enumerates targets and attaches to unattached page targets.
    async fn scan_and_attach(&self) -> Result<()> {
        let result = self
            .transport
            .send(TargetCommand::GetTargets.into(), None, DEFAULT_COMMAND_TIMEOUT)
            .await?;

        let targets: Vec<TargetInfo> = match result.get("targetInfos") {
            Some(infos) => serde_json::from_value(infos.clone())?,
            None => Vec::new(),
        };

        for target in targets.into_iter().filter(TargetInfo::is_page) {
            if self.session_for_target(&target.target_id).is_some() {
                continue;
            }
            if let Err(e) = self.attach_target(&target.target_id).await {
                warn!(target_id = %target.target_id, error = %e, "Failed to attach to target");
            }
        }

        Ok(())
    }

    /// Attaches to one target and records the resulting session.
    async fn attach_target(&self, target_id: &TargetId) -> Result<SessionId> {
        let result = self
            .transport
            .send(
                TargetCommand::attach(target_id.clone()).into(),
                None,
                DEFAULT_COMMAND_TIMEOUT,
            )
            .await?;

        let session_id = result
            .get("sessionId")
            .and_then(Value::as_str)
            .map(SessionId::new)
            .ok_or_else(|| Error::protocol("attach response missing sessionId"))?;

        debug!(target_id = %target_id, session_id = %session_id, "Attached to page target");

        self.sessions
            .lock()
            .insert(target_id.clone(), PageSession::new(session_id.clone()));

        Ok(session_id)
    }

    // ========================================================================
    // Domain Enablement
    // ========================================================================

    /// Enables the required protocol domains on every session.
    ///
    /// Idempotent: domains already enabled on a session are skipped.
    /// Per-domain failures are logged and retried on the next call.
    pub async fn enable_domains_on_all_sessions(&self) {
        let pending: Vec<(TargetId, SessionId, Vec<&'static str>)> = self
            .sessions
            .lock()
            .iter()
            .map(|(target_id, session)| {
                let missing = REQUIRED_DOMAINS
                    .iter()
                    .copied()
                    .filter(|d| !session.is_enabled(d))
                    .collect();
                (target_id.clone(), session.session_id.clone(), missing)
            })
            .collect();

        for (target_id, session_id, domains) in pending {
            for domain in domains {
                match self
                    .transport
                    .send(enable_command(domain), Some(&session_id), DEFAULT_COMMAND_TIMEOUT)
                    .await
                {
                    Ok(_) => {
                        if let Some(session) = self.sessions.lock().get_mut(&target_id) {
                            session.enabled_domains.push(domain);
                        }
                    }
                    Err(e) => {
                        warn!(session_id = %session_id, domain, error = %e, "Failed to enable domain");
                    }
                }
            }
        }
    }

    // ========================================================================
    // Event Reactions
    // ========================================================================

    /// Reacts to a target-created event.
    ///
    /// Attaches if the target is a page we are not yet bound to.
    /// Returns `true` if a new page was attached, so the caller can
    /// re-enable domains and extend an active recording to it.
    pub async fn handle_target_created(&self, target: &TargetInfo) -> bool {
        if !target.is_page() || self.session_for_target(&target.target_id).is_some() {
            return false;
        }

        match self.attach_target(&target.target_id).await {
            Ok(_) => true,
            Err(e) => {
                warn!(target_id = %target.target_id, error = %e, "Failed to attach created target");
                false
            }
        }
    }

    /// Removes the binding for a destroyed target.
    pub fn handle_target_destroyed(&self, target_id: &TargetId) {
        if self.sessions.lock().remove(target_id).is_some() {
            debug!(target_id = %target_id, "Removed session for destroyed target");
        }
    }

    /// Removes the binding whose session was detached.
    pub fn handle_session_detached(&self, session_id: &SessionId) {
        let mut sessions = self.sessions.lock();
        let target = sessions
            .iter()
            .find(|(_, s)| &s.session_id == session_id)
            .map(|(t, _)| t.clone());
        if let Some(target_id) = target {
            sessions.remove(&target_id);
            debug!(target_id = %target_id, session_id = %session_id, "Removed detached session");
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockTransport;
    use serde_json::json;

    fn page_target(id: &str) -> Value {
        json!({"targetId": id, "type": "page", "url": "about:blank", "title": "", "attached": false})
    }

    fn registry(transport: Arc<MockTransport>) -> SessionRegistry {
        SessionRegistry::new(transport, "https://example.com", Duration::from_secs(2))
    }

    #[tokio::test]
    async fn test_attaches_only_page_targets() {
        let transport = Arc::new(MockTransport::new());
        transport.respond(
            "Target.getTargets",
            json!({"targetInfos": [
                page_target("T1"),
                {"targetId": "W1", "type": "service_worker", "url": "", "title": "", "attached": false},
            ]}),
        );
        transport.respond("Target.attachToTarget", json!({"sessionId": "S1"}));

        let registry = registry(Arc::clone(&transport));
        registry.attach_to_all_page_targets().await.expect("attach");

        assert_eq!(registry.session_count(), 1);
        assert_eq!(
            registry.session_for_target(&TargetId::from("T1")),
            Some(SessionId::from("S1"))
        );
        assert_eq!(transport.calls_for("Target.attachToTarget").len(), 1);
    }

    #[tokio::test]
    async fn test_attach_is_idempotent_per_target() {
        let transport = Arc::new(MockTransport::new());
        transport.respond("Target.getTargets", json!({"targetInfos": [page_target("T1")]}));
        transport.respond("Target.getTargets", json!({"targetInfos": [page_target("T1")]}));
        transport.respond("Target.attachToTarget", json!({"sessionId": "S1"}));

        let registry = registry(Arc::clone(&transport));
        registry.attach_to_all_page_targets().await.expect("attach");
        registry.attach_to_all_page_targets().await.expect("attach");

        // Second scan sees the target already bound
        assert_eq!(transport.calls_for("Target.attachToTarget").len(), 1);
        assert_eq!(registry.session_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_bootstrap_creates_target_when_no_pages() {
        crate::testing::init_tracing();
        let transport = Arc::new(MockTransport::new());
        // First scan: nothing attachable. Second scan: the bootstrap page.
        transport.respond("Target.getTargets", json!({"targetInfos": []}));
        transport.respond("Target.getTargets", json!({"targetInfos": [page_target("B1")]}));
        transport.respond("Target.attachToTarget", json!({"sessionId": "S1"}));

        let registry = registry(Arc::clone(&transport));
        registry.attach_to_all_page_targets().await.expect("attach");

        let creates = transport.calls_for("Target.createTarget");
        assert_eq!(creates.len(), 1);
        assert!(creates[0].posted);
        assert_eq!(creates[0].body["params"]["url"], "https://example.com");
        assert_eq!(transport.calls_for("Target.setDiscoverTargets").len(), 1);
        assert_eq!(registry.session_count(), 1);
    }

    #[tokio::test]
    async fn test_enable_domains_idempotent() {
        let transport = Arc::new(MockTransport::new());
        transport.respond("Target.getTargets", json!({"targetInfos": [page_target("T1")]}));
        transport.respond("Target.attachToTarget", json!({"sessionId": "S1"}));

        let registry = registry(Arc::clone(&transport));
        registry.attach_to_all_page_targets().await.expect("attach");

        registry.enable_domains_on_all_sessions().await;
        registry.enable_domains_on_all_sessions().await;

        // Each domain enabled exactly once despite two passes
        for method in REQUIRED_DOMAINS {
            let calls = transport.calls_for(method);
            assert_eq!(calls.len(), 1, "{method} enabled more than once");
            assert_eq!(calls[0].session_id, Some(SessionId::from("S1")));
        }
    }

    #[tokio::test]
    async fn test_target_created_attaches_new_page() {
        let transport = Arc::new(MockTransport::new());
        transport.respond("Target.attachToTarget", json!({"sessionId": "S2"}));

        let registry = registry(Arc::clone(&transport));
        let info: TargetInfo = serde_json::from_value(page_target("T2")).expect("target info");

        assert!(registry.handle_target_created(&info).await);
        assert_eq!(registry.session_count(), 1);

        // Same target again: already bound, no new attach
        assert!(!registry.handle_target_created(&info).await);
        assert_eq!(transport.calls_for("Target.attachToTarget").len(), 1);
    }

    #[tokio::test]
    async fn test_bijection_under_attach_detach() {
        let transport = Arc::new(MockTransport::new());
        transport.respond("Target.attachToTarget", json!({"sessionId": "S1"}));
        transport.respond("Target.attachToTarget", json!({"sessionId": "S2"}));

        let registry = registry(Arc::clone(&transport));
        let t1: TargetInfo = serde_json::from_value(page_target("T1")).expect("target info");
        let t2: TargetInfo = serde_json::from_value(page_target("T2")).expect("target info");

        registry.handle_target_created(&t1).await;
        registry.handle_target_created(&t2).await;

        // Two targets, two distinct sessions
        let mut ids = registry.session_ids();
        ids.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        assert_eq!(ids, vec![SessionId::from("S1"), SessionId::from("S2")]);

        // Session does not outlive its target's detach
        registry.handle_session_detached(&SessionId::from("S1"));
        assert_eq!(registry.session_count(), 1);
        assert_eq!(registry.session_for_target(&TargetId::from("T1")), None);

        registry.handle_target_destroyed(&TargetId::from("T2"));
        assert_eq!(registry.session_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_attach_response_without_session_is_skipped() {
        let transport = Arc::new(MockTransport::new());
        transport.respond("Target.getTargets", json!({"targetInfos": [page_target("T1")]}));
        transport.respond("Target.attachToTarget", json!({}));
        // Bootstrap path follows since nothing attached
        transport.respond("Target.getTargets", json!({"targetInfos": []}));

        let registry = registry(Arc::clone(&transport));
        registry.attach_to_all_page_targets().await.expect("attach");
        assert_eq!(registry.session_count(), 0);
    }
}
