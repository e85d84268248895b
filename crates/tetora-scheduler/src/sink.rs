use async_trait::async_trait;
use tetora_core::types::{Task, TaskId};

/// Decoupling seam into C5 (`tetora-dispatcher`), same shape as
/// `tetora_webhooks::TaskSink` and `tetora_channels::ChannelRuntime`: the
/// scheduler's delivery worker constructs and hands off a `Task` without
/// depending on the dispatcher crate.
#[async_trait]
pub trait JobSink: Send + Sync {
    async fn submit(&self, task: Task) -> TaskId;
}
