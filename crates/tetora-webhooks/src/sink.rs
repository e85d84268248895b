use async_trait::async_trait;
use tetora_core::types::{Task, TaskId};

/// Decoupling seam into C5 (`tetora-dispatcher`): the webhook pipeline
/// constructs a `Task` and hands it off without depending on the
/// dispatcher crate or blocking on the task's outcome — step 6 is an
/// asynchronous, fire-and-forget submission that returns `taskId`
/// immediately. Same shape as `tetora_channels::ChannelRuntime`.
#[async_trait]
pub trait TaskSink: Send + Sync {
    async fn submit(&self, task: Task) -> TaskId;
}
