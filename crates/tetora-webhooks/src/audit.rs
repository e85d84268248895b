//! Audit logging seam (spec §4.7: "all webhook auth failures and filter
//! rejections MUST be audit-logged with the client IP"). Kept as a trait
//! rather than a concrete store so this crate doesn't need an opinion on
//! where audit entries live — same decoupling shape as
//! `tetora_dispatcher::PostActionSink`.

use async_trait::async_trait;

#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, event: &str, source: &str, client_ip: &str, detail: &str);
}

/// Default sink: structured `tracing` event at the `audit` target, in the
/// teacher's logging idiom. Good enough for a standalone crate; the
/// gateway may swap in a store-backed sink at startup.
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn record(&self, event: &str, source: &str, client_ip: &str, detail: &str) {
        tracing::warn!(
            target: "audit",
            event,
            source,
            client_ip,
            detail,
            "webhook audit event"
        );
    }
}
