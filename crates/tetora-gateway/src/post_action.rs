//! Stand-in `PostActionSink`: role memory key-values and outbound webhook
//! firing both depend on collaborators (the key-value memory store, the
//! channel adapters) that spec §1 places out of scope, so this sink only
//! gives operators a structured audit trail of every terminal task.

use async_trait::async_trait;
use tetora_core::types::{Task, TaskResult};
use tetora_dispatcher::PostActionSink;
use tracing::info;

pub struct LoggingPostActionSink;

#[async_trait]
impl PostActionSink for LoggingPostActionSink {
    async fn on_task_complete(&self, task: &Task, result: &TaskResult) {
        info!(
            task_id = %task.id,
            source = %task.source,
            status = %result.status,
            cost_usd = result.cost_usd,
            duration_ms = result.duration_ms,
            "task finished"
        );
    }
}
