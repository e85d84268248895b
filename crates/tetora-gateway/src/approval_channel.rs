//! Stand-in `ApprovalChannel`: no concrete chat adapter is wired into this
//! binary (channel adapters are an external collaborator per spec §1), so
//! the only way to actually answer a pending approval is the
//! `POST /approvals/{id}` route in `crate::http::approvals`. This channel's
//! `send_request` just puts the pending request on the record so an
//! operator watching the logs knows to call that route.

use async_trait::async_trait;
use tetora_approval::{ApprovalChannel, ApprovalRequest};
use tracing::warn;

pub struct LoggingApprovalChannel;

#[async_trait]
impl ApprovalChannel for LoggingApprovalChannel {
    async fn send_request(&self, request: &ApprovalRequest) {
        warn!(
            id = %request.id,
            tool = %request.tool,
            summary = %request.summary,
            "tool call awaiting approval — resolve with POST /approvals/{}",
            request.id
        );
    }
}
