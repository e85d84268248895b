//! Wraps a `tetora_agent::Tool` so calls to tools named in
//! `ToolPolicyConfig::approval_required` go through C8 before they run
//! (spec §4.5 step 5: "on tool calls that require approval, the provider
//! invokes C8 synchronously and waits"). Lives here, not in `tetora-agent`,
//! because only this crate depends on both `tetora-agent` and
//! `tetora-approval` — see the `tetora-agent`/`tetora-approval` DESIGN.md
//! entries for why that dependency is deliberately one-directional.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tetora_agent::{Tool, ToolResult};
use tetora_approval::{ApprovalChannel, ApprovalError, ApprovalGate, ApprovalRequest};
use tetora_core::types::TaskId;
use tracing::warn;

pub struct ApprovalGatedTool {
    inner: Arc<dyn Tool>,
    gate: ApprovalGate,
    channel: Arc<dyn ApprovalChannel>,
    timeout: Duration,
}

impl ApprovalGatedTool {
    pub fn new(
        inner: Arc<dyn Tool>,
        gate: ApprovalGate,
        channel: Arc<dyn ApprovalChannel>,
        timeout: Duration,
    ) -> Self {
        Self { inner, gate, channel, timeout }
    }
}

#[async_trait]
impl Tool for ApprovalGatedTool {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn description(&self) -> &str {
        self.inner.description()
    }

    fn input_schema(&self) -> serde_json::Value {
        self.inner.input_schema()
    }

    fn requires_sandbox(&self) -> bool {
        self.inner.requires_sandbox()
    }

    async fn execute(&self, input: serde_json::Value) -> ToolResult {
        let request = ApprovalRequest {
            id: TaskId::new().to_string(),
            tool: self.inner.name().to_string(),
            summary: summarize_input(&input),
        };

        match self.gate.request_approval(request, self.channel.as_ref(), self.timeout).await {
            Ok(true) => self.inner.execute(input).await,
            Ok(false) => ToolResult::error(format!("tool '{}' was rejected by approver", self.inner.name())),
            Err(ApprovalError::TimedOut) => {
                warn!(tool = self.inner.name(), "approval request timed out");
                ToolResult::error(format!("approval for tool '{}' timed out", self.inner.name()))
            }
            Err(ApprovalError::Cancelled) => {
                ToolResult::error(format!("approval for tool '{}' was cancelled", self.inner.name()))
            }
        }
    }
}

/// A short human-readable summary of the tool input, shown alongside the
/// Approve/Reject/Always buttons. Truncated so it fits a chat message.
fn summarize_input(input: &serde_json::Value) -> String {
    let rendered = input.to_string();
    const MAX: usize = 400;
    if rendered.chars().count() > MAX {
        let truncated: String = rendered.chars().take(MAX).collect();
        format!("{truncated}…")
    } else {
        rendered
    }
}
