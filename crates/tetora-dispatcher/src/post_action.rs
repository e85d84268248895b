//! Post-action hooks (spec §4.5 step 7): "best effort; never fatal". Session
//! history recording lives in this crate (it's already a direct
//! `tetora-sessions` dependency), but role memory key-values, audit
//! logging, and outbound webhook firing are concerns of higher-level
//! crates this one must not depend on (to keep the workspace a DAG —
//! `tetora-gateway` sits above both `tetora-dispatcher` and
//! `tetora-webhooks`). `PostActionSink` is the seam: the dispatcher calls
//! it after every terminal task, and the gateway wires in the concrete
//! implementation at startup. New trait; same decoupling shape as
//! `tetora-router::RoleClassifier` and `tetora-sessions::CompactionSummarizer`.

use async_trait::async_trait;
use tetora_core::types::{Task, TaskResult};

#[async_trait]
pub trait PostActionSink: Send + Sync {
    /// Called once per terminal task, after the slot is released and the
    /// running-table entry removed. Must not panic; the dispatcher does not
    /// treat a sink failure as a reason to alter the already-finalized
    /// `TaskResult`.
    async fn on_task_complete(&self, task: &Task, result: &TaskResult);
}

/// Default sink for tests and standalone dispatcher use: does nothing.
pub struct NoopPostActionSink;

#[async_trait]
impl PostActionSink for NoopPostActionSink {
    async fn on_task_complete(&self, _task: &Task, _result: &TaskResult) {}
}
