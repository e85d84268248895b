//! C8 — approval gate: synchronous request/response via an external
//! channel for tool approval.
//!
//! New, but grounded on two teacher patterns: the *concept* of an
//! allowed-pending-sign-off action comes from
//! `skynet-users/src/permissions.rs::PermissionCheck::NeedsApproval`; the
//! *mechanism* (a short-critical-section `DashMap`-keyed pending table,
//! resolved from outside the waiting task) comes from
//! `skynet-gateway::app::AppState::active_operations`, generalized from
//! "cancellation token per running operation" to "oneshot resolution
//! channel per pending approval".

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Clone)]
pub struct ApprovalRequest {
    pub id: String,
    pub tool: String,
    pub summary: String,
}

#[derive(Debug, Error)]
pub enum ApprovalError {
    #[error("approval request timed out")]
    TimedOut,

    #[error("approval gate shut down before resolving")]
    Cancelled,
}

/// External collaborator that actually delivers the Approve/Reject/Always
/// prompt (typically a chat channel message). The gate only needs the
/// request sent; the eventual answer arrives through `resolve`/`resolve_always`,
/// called from wherever the button callback lands (e.g. a webhook route).
#[async_trait]
pub trait ApprovalChannel: Send + Sync {
    async fn send_request(&self, request: &ApprovalRequest);
}

struct Pending {
    tx: oneshot::Sender<bool>,
}

/// Tracks in-flight approval requests and the per-gate "Always approve"
/// set. Cheap to clone (wraps an `Arc`).
#[derive(Clone)]
pub struct ApprovalGate {
    inner: Arc<Inner>,
}

struct Inner {
    pending: DashMap<String, Pending>,
    auto_approved: DashSet<String>,
}

impl ApprovalGate {
    /// `seed_auto_approved` comes from static config (spec §4.8: "the
    /// auto-approval set is seeded from static config").
    pub fn new(seed_auto_approved: impl IntoIterator<Item = String>) -> Self {
        let auto_approved = DashSet::new();
        for tool in seed_auto_approved {
            auto_approved.insert(tool);
        }
        Self {
            inner: Arc::new(Inner {
                pending: DashMap::new(),
                auto_approved,
            }),
        }
    }

    /// `RequestApproval(ctx, {id, tool, summary}) -> (bool, error)`. Sends
    /// the request through `channel`, then blocks until `resolve`/
    /// `resolve_always` is called with this request's `id`, or `timeout`
    /// elapses.
    #[instrument(skip(self, channel), fields(id = %request.id, tool = %request.tool))]
    pub async fn request_approval(
        &self,
        request: ApprovalRequest,
        channel: &dyn ApprovalChannel,
        timeout: Duration,
    ) -> Result<bool, ApprovalError> {
        if self.inner.auto_approved.contains(&request.tool) {
            debug!("tool is in the always-approve set, short-circuiting");
            return Ok(true);
        }

        let (tx, rx) = oneshot::channel();
        self.inner.pending.insert(request.id.clone(), Pending { tx });

        channel.send_request(&request).await;

        let result = tokio::time::timeout(timeout, rx).await;
        self.inner.pending.remove(&request.id);

        match result {
            Ok(Ok(approved)) => Ok(approved),
            Ok(Err(_)) => Err(ApprovalError::Cancelled),
            Err(_) => {
                warn!("approval request timed out");
                Err(ApprovalError::TimedOut)
            }
        }
    }

    /// Deliver a plain Approve/Reject answer for `id`. A no-op (not an
    /// error) if `id` is unknown or already resolved — spec §4.8:
    /// "duplicate callbacks are ignored".
    pub fn resolve(&self, id: &str, approved: bool) {
        if let Some((_, pending)) = self.inner.pending.remove(id) {
            let _ = pending.tx.send(approved);
        }
    }

    /// Deliver an "Always approve" answer: resolves this request as
    /// approved and adds `tool` to the auto-approval set so future
    /// requests for it short-circuit.
    pub fn resolve_always(&self, id: &str, tool: &str) {
        self.inner.auto_approved.insert(tool.to_string());
        self.resolve(id, true);
    }

    pub fn is_auto_approved(&self, tool: &str) -> bool {
        self.inner.auto_approved.contains(tool)
    }

    /// Admin command: clear one tool (or, with `tool = None`, everything)
    /// from the auto-approval set. Never touches config; in-memory only.
    pub fn clear_auto_approved(&self, tool: Option<&str>) {
        match tool {
            Some(t) => {
                self.inner.auto_approved.remove(t);
            }
            None => {
                self.inner.auto_approved.clear();
            }
        }
        info!(tool = ?tool, "cleared auto-approval entries");
    }

    pub fn pending_count(&self) -> usize {
        self.inner.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct RecordingChannel {
        sent: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl ApprovalChannel for RecordingChannel {
        async fn send_request(&self, _request: &ApprovalRequest) {
            self.sent.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn req(id: &str) -> ApprovalRequest {
        ApprovalRequest {
            id: id.to_string(),
            tool: "execute_command".to_string(),
            summary: "rm -rf /tmp/scratch".to_string(),
        }
    }

    #[tokio::test]
    async fn resolve_unblocks_the_waiting_request() {
        let gate = ApprovalGate::new(vec![]);
        let channel = RecordingChannel { sent: Arc::new(AtomicUsize::new(0)) };

        let gate2 = gate.clone();
        let waiter = tokio::spawn(async move {
            gate2.request_approval(req("r1"), &channel, Duration::from_secs(5)).await
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        gate.resolve("r1", true);

        let result = waiter.await.unwrap();
        assert!(matches!(result, Ok(true)));
    }

    #[tokio::test]
    async fn duplicate_resolve_calls_are_ignored() {
        let gate = ApprovalGate::new(vec![]);
        gate.resolve("unknown", true);
        gate.resolve("unknown", false);
        assert_eq!(gate.pending_count(), 0);
    }

    #[tokio::test]
    async fn times_out_when_nobody_resolves() {
        let gate = ApprovalGate::new(vec![]);
        let channel = RecordingChannel { sent: Arc::new(AtomicUsize::new(0)) };

        let result = gate
            .request_approval(req("r2"), &channel, Duration::from_millis(50))
            .await;
        assert!(matches!(result, Err(ApprovalError::TimedOut)));
        assert_eq!(gate.pending_count(), 0);
    }

    #[tokio::test]
    async fn always_approve_short_circuits_future_requests() {
        let gate = ApprovalGate::new(vec![]);
        let channel = RecordingChannel { sent: Arc::new(AtomicUsize::new(0)) };

        let gate2 = gate.clone();
        let waiter = tokio::spawn(async move {
            gate2.request_approval(req("r3"), &channel, Duration::from_secs(5)).await
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        gate.resolve_always("r3", "execute_command");
        assert!(matches!(waiter.await.unwrap(), Ok(true)));

        assert!(gate.is_auto_approved("execute_command"));

        let channel2 = RecordingChannel { sent: Arc::new(AtomicUsize::new(0)) };
        let result = gate
            .request_approval(req("r4"), &channel2, Duration::from_secs(5))
            .await;
        assert!(matches!(result, Ok(true)));
        // Short-circuited: the channel was never actually asked.
        assert_eq!(channel2.sent.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn seeded_auto_approve_set_applies_from_construction() {
        let gate = ApprovalGate::new(vec!["read_file".to_string()]);
        let channel = RecordingChannel { sent: Arc::new(AtomicUsize::new(0)) };
        let mut request = req("r5");
        request.tool = "read_file".to_string();

        let result = gate.request_approval(request, &channel, Duration::from_secs(5)).await;
        assert!(matches!(result, Ok(true)));
        assert_eq!(channel.sent.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn clear_auto_approved_removes_a_single_tool() {
        let gate = ApprovalGate::new(vec!["read_file".to_string(), "write_file".to_string()]);
        gate.clear_auto_approved(Some("read_file"));
        assert!(!gate.is_auto_approved("read_file"));
        assert!(gate.is_auto_approved("write_file"));
    }
}
