//! Awaitable human decisions for blocked or unresolved verdicts.
//!
//! A decision request is enqueued into the pending map *before* any
//! subscriber callback runs, so a subscriber that responds synchronously
//! can resolve the ticket it was just notified about. Each request resolves
//! exactly once: respond, cancel, timeout, and handler shutdown are
//! mutually exclusive outcomes, and whichever happens first cancels the
//! others' timers.

use crate::context::now_millis;
use crate::result::{ValidationSummary, ValidatorResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;

/// What shape of answer the request expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionKind {
    ApproveReject,
    SelectOption,
    ProvideFeedback,
    Override,
}

/// Terminal decision states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Approved,
    Rejected,
    Deferred,
    Overridden,
    Cancelled,
}

/// A pending question for a human.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionRequest {
    pub id: String,
    pub kind: DecisionKind,
    pub title: String,
    pub description: String,
    pub summary: ValidationSummary,
    /// The results most relevant to this decision.
    #[serde(default)]
    pub relevant: Vec<ValidatorResult>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    pub created_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Value>,
}

/// A human's (or the timeout's) answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionResponse {
    pub request_id: String,
    pub decision: Decision,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_option: Option<String>,
    pub responded_at: i64,
}

impl DecisionResponse {
    pub fn new(request_id: impl Into<String>, decision: Decision) -> Self {
        Self {
            request_id: request_id.into(),
            decision,
            feedback: None,
            selected_option: None,
            responded_at: now_millis(),
        }
    }

    pub fn with_feedback(mut self, feedback: impl Into<String>) -> Self {
        self.feedback = Some(feedback.into());
        self
    }
}

/// Per-request options for [`HumanDecisionHandler::request_decision`].
#[derive(Debug, Clone, Default)]
pub struct DecisionOptions {
    pub options: Vec<String>,
    /// Overrides the handler-level default timeout.
    pub timeout_ms: Option<u64>,
    pub relevant: Vec<ValidatorResult>,
    pub context: Option<Value>,
}

/// Callback notified of each new request. Errors are swallowed and logged;
/// a broken subscriber never breaks the handler.
pub trait DecisionSubscriber: Send + Sync {
    fn on_request(&self, request: &DecisionRequest) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedEntryKind {
    Requested,
    Resolved,
}

/// A human-readable feed event describing request lifecycle.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedEntry {
    pub kind: FeedEntryKind,
    pub request_id: String,
    pub title: String,
    pub decision: Option<Decision>,
    pub timestamp: i64,
}

#[derive(Debug, Clone)]
pub struct HandlerConfig {
    /// Publish feed entries on request/resolution.
    pub emit_feed_entries: bool,
    /// A timeout synthesizes `Rejected` instead of `Deferred`.
    pub auto_reject_on_timeout: bool,
    /// Applied when a request carries no timeout of its own.
    pub default_timeout_ms: Option<u64>,
    pub feed_capacity: usize,
}

impl Default for HandlerConfig {
    fn default() -> Self {
        Self {
            emit_feed_entries: true,
            auto_reject_on_timeout: false,
            default_timeout_ms: None,
            feed_capacity: 64,
        }
    }
}

struct PendingDecision {
    request: DecisionRequest,
    responder: oneshot::Sender<DecisionResponse>,
    timer: Option<JoinHandle<()>>,
}

struct HandlerInner {
    config: HandlerConfig,
    pending: Mutex<HashMap<String, PendingDecision>>,
    subscribers: RwLock<Vec<Arc<dyn DecisionSubscriber>>>,
    feed_tx: broadcast::Sender<FeedEntry>,
    counter: AtomicU64,
}

/// Turns blocked or unresolved verdicts into awaitable decision requests
/// with timeout and cancellation. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct HumanDecisionHandler {
    inner: Arc<HandlerInner>,
}

impl std::fmt::Debug for HumanDecisionHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HumanDecisionHandler")
            .field("pending", &self.pending_count())
            .finish_non_exhaustive()
    }
}

/// Handle to one pending decision; await it with [`DecisionTicket::wait`].
#[derive(Debug)]
pub struct DecisionTicket {
    id: String,
    rx: oneshot::Receiver<DecisionResponse>,
}

impl DecisionTicket {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Wait for the decision. If the handler is dropped without cleanup the
    /// ticket resolves to a synthesized `Cancelled` response.
    pub async fn wait(self) -> DecisionResponse {
        match self.rx.await {
            Ok(response) => response,
            Err(_) => DecisionResponse::new(self.id, Decision::Cancelled)
                .with_feedback("Decision handler dropped"),
        }
    }
}

impl Default for HumanDecisionHandler {
    fn default() -> Self {
        Self::new(HandlerConfig::default())
    }
}

impl HumanDecisionHandler {
    pub fn new(config: HandlerConfig) -> Self {
        let (feed_tx, _) = broadcast::channel(config.feed_capacity.max(1));
        Self {
            inner: Arc::new(HandlerInner {
                config,
                pending: Mutex::new(HashMap::new()),
                subscribers: RwLock::new(Vec::new()),
                feed_tx,
                counter: AtomicU64::new(0),
            }),
        }
    }

    pub fn add_subscriber(&self, subscriber: Arc<dyn DecisionSubscriber>) {
        self.inner
            .subscribers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(subscriber);
    }

    pub fn subscribe_feed(&self) -> broadcast::Receiver<FeedEntry> {
        self.inner.feed_tx.subscribe()
    }

    pub fn pending_count(&self) -> usize {
        self.inner
            .pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    pub fn has_pending(&self) -> bool {
        self.pending_count() > 0
    }

    /// Snapshot of one pending request, if still unresolved.
    pub fn get_pending(&self, id: &str) -> Option<DecisionRequest> {
        self.inner
            .pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(id)
            .map(|p| p.request.clone())
    }

    /// Enqueue a decision request and return an awaitable ticket.
    pub fn request_decision(
        &self,
        kind: DecisionKind,
        title: impl Into<String>,
        description: impl Into<String>,
        summary: ValidationSummary,
        opts: DecisionOptions,
    ) -> DecisionTicket {
        let seq = self.inner.counter.fetch_add(1, Ordering::SeqCst) + 1;
        let id = format!("decision-{seq}");
        let timeout_ms = opts.timeout_ms.or(self.inner.config.default_timeout_ms);

        let request = DecisionRequest {
            id: id.clone(),
            kind,
            title: title.into(),
            description: description.into(),
            summary,
            relevant: opts.relevant,
            options: opts.options,
            timeout_ms,
            created_at: now_millis(),
            context: opts.context,
        };

        let (responder, rx) = oneshot::channel();

        // Enqueue before anything else: a subscriber may respond from
        // inside its callback.
        self.inner
            .pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(
                id.clone(),
                PendingDecision {
                    request: request.clone(),
                    responder,
                    timer: None,
                },
            );

        if self.inner.config.emit_feed_entries {
            let _ = self.inner.feed_tx.send(FeedEntry {
                kind: FeedEntryKind::Requested,
                request_id: id.clone(),
                title: request.title.clone(),
                decision: None,
                timestamp: now_millis(),
            });
        }

        if let Some(ms) = timeout_ms.filter(|ms| *ms > 0) {
            let handler = self.clone();
            let timer_id = id.clone();
            let timer = tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(ms)).await;
                handler.expire(&timer_id, ms);
            });
            // The entry may already be gone if a feed consumer responded
            // between insert and here; then the timer must not linger.
            let mut pending = self.inner.pending.lock().unwrap_or_else(|e| e.into_inner());
            match pending.get_mut(&id) {
                Some(entry) => entry.timer = Some(timer),
                None => timer.abort(),
            }
        }

        let subscribers: Vec<Arc<dyn DecisionSubscriber>> = self
            .inner
            .subscribers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        for subscriber in subscribers {
            if let Err(e) = subscriber.on_request(&request) {
                tracing::warn!(request_id = %request.id, error = %e, "decision subscriber failed");
            }
        }

        DecisionTicket { id, rx }
    }

    /// Resolve a pending request. Returns false when the id is unknown
    /// (already resolved, cancelled, timed out, or never issued).
    pub fn respond(&self, mut response: DecisionResponse) -> bool {
        let entry = self
            .inner
            .pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&response.request_id);
        let Some(entry) = entry else {
            return false;
        };

        if let Some(timer) = entry.timer {
            timer.abort();
        }
        response.responded_at = now_millis();
        let decision = response.decision;
        // Receiver may be gone; resolution still counts.
        let _ = entry.responder.send(response);

        if self.inner.config.emit_feed_entries {
            let _ = self.inner.feed_tx.send(FeedEntry {
                kind: FeedEntryKind::Resolved,
                request_id: entry.request.id.clone(),
                title: entry.request.title.clone(),
                decision: Some(decision),
                timestamp: now_millis(),
            });
        }
        true
    }

    /// Cancel one pending request, resolving it as rejected.
    pub fn cancel(&self, id: &str) -> bool {
        self.respond(
            DecisionResponse::new(id, Decision::Rejected).with_feedback("Request cancelled"),
        )
    }

    /// Cancel every pending request (handler disposal). Tickets resolve
    /// with `Cancelled`.
    pub fn cleanup(&self) {
        let drained: Vec<PendingDecision> = {
            let mut pending = self.inner.pending.lock().unwrap_or_else(|e| e.into_inner());
            pending.drain().map(|(_, entry)| entry).collect()
        };
        for entry in drained {
            if let Some(timer) = entry.timer {
                timer.abort();
            }
            let id = entry.request.id.clone();
            let _ = entry.responder.send(
                DecisionResponse::new(&id, Decision::Cancelled)
                    .with_feedback("Decision handler shut down"),
            );
            if self.inner.config.emit_feed_entries {
                let _ = self.inner.feed_tx.send(FeedEntry {
                    kind: FeedEntryKind::Resolved,
                    request_id: id,
                    title: entry.request.title.clone(),
                    decision: Some(Decision::Cancelled),
                    timestamp: now_millis(),
                });
            }
        }
    }

    fn expire(&self, id: &str, timeout_ms: u64) {
        let decision = if self.inner.config.auto_reject_on_timeout {
            Decision::Rejected
        } else {
            Decision::Deferred
        };
        let resolved = self.respond(
            DecisionResponse::new(id, decision)
                .with_feedback(format!("Decision request timed out after {timeout_ms} ms")),
        );
        if resolved {
            tracing::debug!(request_id = id, timeout_ms, "decision request timed out");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn handler() -> HumanDecisionHandler {
        HumanDecisionHandler::default()
    }

    fn request(h: &HumanDecisionHandler, opts: DecisionOptions) -> DecisionTicket {
        h.request_decision(
            DecisionKind::ApproveReject,
            "Blocked change",
            "A required validator rejected the change.",
            ValidationSummary::empty(),
            opts,
        )
    }

    #[tokio::test]
    async fn test_respond_resolves_ticket() {
        let h = handler();
        let ticket = request(&h, DecisionOptions::default());
        let id = ticket.id().to_string();
        assert!(h.has_pending());

        assert!(h.respond(
            DecisionResponse::new(&id, Decision::Approved).with_feedback("looks fine")
        ));
        let response = ticket.wait().await;
        assert_eq!(response.decision, Decision::Approved);
        assert_eq!(response.feedback.as_deref(), Some("looks fine"));
        assert!(response.responded_at > 0);
        assert!(!h.has_pending());
    }

    #[tokio::test]
    async fn test_respond_unknown_id_returns_false() {
        let h = handler();
        assert!(!h.respond(DecisionResponse::new("decision-999", Decision::Approved)));
    }

    #[tokio::test]
    async fn test_request_resolves_exactly_once() {
        let h = handler();
        let ticket = request(&h, DecisionOptions::default());
        let id = ticket.id().to_string();

        assert!(h.respond(DecisionResponse::new(&id, Decision::Approved)));
        assert!(!h.respond(DecisionResponse::new(&id, Decision::Rejected)));
        assert!(!h.cancel(&id));

        let response = ticket.wait().await;
        assert_eq!(response.decision, Decision::Approved);
    }

    #[tokio::test]
    async fn test_cancel_synthesizes_rejection() {
        let h = handler();
        let ticket = request(&h, DecisionOptions::default());
        let id = ticket.id().to_string();

        assert!(h.cancel(&id));
        let response = ticket.wait().await;
        assert_eq!(response.decision, Decision::Rejected);
        assert_eq!(response.feedback.as_deref(), Some("Request cancelled"));
    }

    #[tokio::test]
    async fn test_timeout_defers_by_default() {
        let h = handler();
        let ticket = request(
            &h,
            DecisionOptions {
                timeout_ms: Some(20),
                ..DecisionOptions::default()
            },
        );
        let response = ticket.wait().await;
        assert_eq!(response.decision, Decision::Deferred);
        assert!(response.feedback.unwrap().contains("timed out after 20 ms"));
        assert!(!h.has_pending());
    }

    #[tokio::test]
    async fn test_timeout_auto_reject() {
        let h = HumanDecisionHandler::new(HandlerConfig {
            auto_reject_on_timeout: true,
            ..HandlerConfig::default()
        });
        let ticket = request(
            &h,
            DecisionOptions {
                timeout_ms: Some(20),
                ..DecisionOptions::default()
            },
        );
        let response = ticket.wait().await;
        assert_eq!(response.decision, Decision::Rejected);
    }

    #[tokio::test]
    async fn test_default_timeout_from_config() {
        let h = HumanDecisionHandler::new(HandlerConfig {
            default_timeout_ms: Some(20),
            ..HandlerConfig::default()
        });
        let ticket = request(&h, DecisionOptions::default());
        let response = ticket.wait().await;
        assert_eq!(response.decision, Decision::Deferred);
    }

    #[tokio::test]
    async fn test_respond_cancels_timer() {
        let h = handler();
        let ticket = request(
            &h,
            DecisionOptions {
                timeout_ms: Some(50),
                ..DecisionOptions::default()
            },
        );
        let id = ticket.id().to_string();
        assert!(h.respond(DecisionResponse::new(&id, Decision::Approved)));
        let response = ticket.wait().await;
        assert_eq!(response.decision, Decision::Approved);

        // The timer firing later must not resurrect or re-resolve anything.
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(!h.has_pending());
    }

    #[tokio::test]
    async fn test_cleanup_cancels_all_pending() {
        let h = handler();
        let first = request(&h, DecisionOptions::default());
        let second = request(&h, DecisionOptions::default());
        assert_eq!(h.pending_count(), 2);

        h.cleanup();
        assert_eq!(h.pending_count(), 0);
        assert_eq!(first.wait().await.decision, Decision::Cancelled);
        assert_eq!(second.wait().await.decision, Decision::Cancelled);
    }

    #[tokio::test]
    async fn test_dropped_handler_resolves_ticket_cancelled() {
        let h = handler();
        let ticket = request(&h, DecisionOptions::default());
        drop(h);
        let response = ticket.wait().await;
        assert_eq!(response.decision, Decision::Cancelled);
    }

    #[tokio::test]
    async fn test_subscriber_can_respond_synchronously() {
        struct AutoApprover {
            handler: HumanDecisionHandler,
        }
        impl DecisionSubscriber for AutoApprover {
            fn on_request(&self, request: &DecisionRequest) -> anyhow::Result<()> {
                // The request is already pending when subscribers run.
                assert!(
                    self.handler
                        .respond(DecisionResponse::new(&request.id, Decision::Approved))
                );
                Ok(())
            }
        }

        let h = handler();
        h.add_subscriber(Arc::new(AutoApprover { handler: h.clone() }));
        let ticket = request(&h, DecisionOptions::default());
        let response = ticket.wait().await;
        assert_eq!(response.decision, Decision::Approved);
    }

    #[tokio::test]
    async fn test_subscriber_errors_are_swallowed() {
        struct Broken;
        impl DecisionSubscriber for Broken {
            fn on_request(&self, _request: &DecisionRequest) -> anyhow::Result<()> {
                anyhow::bail!("subscriber exploded")
            }
        }
        static CALLS: AtomicUsize = AtomicUsize::new(0);
        struct Counter;
        impl DecisionSubscriber for Counter {
            fn on_request(&self, _request: &DecisionRequest) -> anyhow::Result<()> {
                CALLS.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        }

        let h = handler();
        h.add_subscriber(Arc::new(Broken));
        h.add_subscriber(Arc::new(Counter));
        let ticket = request(&h, DecisionOptions::default());
        // The broken subscriber did not prevent the second one from running.
        assert_eq!(CALLS.load(Ordering::SeqCst), 1);
        h.cancel(ticket.id());
    }

    #[tokio::test]
    async fn test_feed_entries_for_lifecycle() {
        let h = handler();
        let mut feed = h.subscribe_feed();
        let ticket = request(&h, DecisionOptions::default());
        let id = ticket.id().to_string();
        h.respond(DecisionResponse::new(&id, Decision::Overridden));

        let requested = feed.recv().await.unwrap();
        assert_eq!(requested.kind, FeedEntryKind::Requested);
        assert_eq!(requested.request_id, id);
        let resolved = feed.recv().await.unwrap();
        assert_eq!(resolved.kind, FeedEntryKind::Resolved);
        assert_eq!(resolved.decision, Some(Decision::Overridden));
    }

    #[tokio::test]
    async fn test_get_pending_snapshot() {
        let h = handler();
        let ticket = request(
            &h,
            DecisionOptions {
                options: vec!["allow".to_string(), "deny".to_string()],
                ..DecisionOptions::default()
            },
        );
        let snapshot = h.get_pending(ticket.id()).unwrap();
        assert_eq!(snapshot.options, vec!["allow", "deny"]);
        h.cancel(ticket.id());
        assert!(h.get_pending(ticket.id()).is_none());
    }
}
