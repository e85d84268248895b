//! Bridges the two async fire-and-forget ingestion seams —
//! `tetora_webhooks::TaskSink` (C7) and `tetora_scheduler::JobSink` (cron) —
//! onto the one dispatcher (C5). Both traits have the identical
//! `async fn submit(&self, task: Task) -> TaskId` shape by design, so one
//! struct implements both rather than duplicating the spawn-and-return
//! logic per caller.

use std::sync::Arc;

use async_trait::async_trait;
use tetora_core::config::RoleConfig;
use tetora_core::types::{Task, TaskId, TaskResult};
use tetora_dispatcher::Dispatcher;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::roles::RoleRegistry;

/// Fallback persona used when a task names a role the registry doesn't
/// know about — spec §4.5 has no "unknown role" terminal state, so rather
/// than reject the task outright this runs it with a maximally
/// conservative, unprivileged policy.
fn fallback_role() -> RoleConfig {
    RoleConfig {
        soul_file: None,
        model: "claude-sonnet-4-6".to_string(),
        description: "fallback persona for an unrecognized role".to_string(),
        permission_mode: Default::default(),
        trust_level: 0,
        tool_policy: Default::default(),
    }
}

pub struct DispatchSink {
    dispatcher: Arc<Dispatcher>,
    roles: Arc<RoleRegistry>,
    default_role: String,
    shutdown: CancellationToken,
}

impl DispatchSink {
    pub fn new(
        dispatcher: Arc<Dispatcher>,
        roles: Arc<RoleRegistry>,
        default_role: String,
        shutdown: CancellationToken,
    ) -> Self {
        Self { dispatcher, roles, default_role, shutdown }
    }

    fn resolve_role(&self, task: &Task) -> RoleConfig {
        let role_key = task.role.clone().unwrap_or_else(|| self.default_role.clone());
        match self.roles.get(&role_key) {
            Some(r) => r.clone(),
            None => {
                warn!(role = %role_key, "task named an unregistered role, running with the fallback persona");
                fallback_role()
            }
        }
    }

    fn submit_inner(&self, task: Task) -> TaskId {
        let id = task.id.clone();
        let role = self.resolve_role(&task);

        let dispatcher = Arc::clone(&self.dispatcher);
        let cancel = self.shutdown.child_token();
        tokio::spawn(async move {
            dispatcher.dispatch(task, &role, cancel).await;
        });

        id
    }

    /// Fire-and-forget dispatch, returning the task id immediately —
    /// used by `POST /dispatch` when the caller asks for async delivery.
    pub fn dispatch_async(&self, task: Task) -> TaskId {
        self.submit_inner(task)
    }

    /// Synchronous dispatch: awaits the full run and returns its result —
    /// used by `POST /dispatch` and `POST /route` in the default (sync) case.
    pub async fn dispatch_sync(&self, task: Task) -> TaskResult {
        let role = self.resolve_role(&task);
        let cancel = self.shutdown.child_token();
        self.dispatcher.dispatch(task, &role, cancel).await
    }
}

#[async_trait]
impl tetora_webhooks::TaskSink for DispatchSink {
    async fn submit(&self, task: Task) -> TaskId {
        self.submit_inner(task)
    }
}

#[async_trait]
impl tetora_scheduler::JobSink for DispatchSink {
    async fn submit(&self, task: Task) -> TaskId {
        self.submit_inner(task)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::time::Duration;

    use rusqlite::Connection;
    use tetora_agent::testing::EchoProvider;
    use tetora_approval::ApprovalGate;
    use tetora_core::config::{DispatcherConfig, SlotConfig, ToolPolicyConfig};
    use tetora_events::EventBroker;
    use tetora_scheduler::JobSink;
    use tetora_sessions::SessionManager;
    use tetora_slots::{SlotGuard, SlotGuardConfig};
    use tetora_webhooks::TaskSink;

    fn sink_with_role(name: &str) -> DispatchSink {
        let conn = Connection::open_in_memory().unwrap();
        tetora_sessions::db::init_db(&conn).unwrap();
        let sessions = Arc::new(SessionManager::new(conn));
        let events = EventBroker::new();
        let dispatcher = Arc::new(Dispatcher::new(
            DispatcherConfig::default(),
            SlotGuard::new(SlotGuardConfig::from(&SlotConfig::default()), events.clone()),
            events,
            sessions,
            Arc::new(crate::summarizer::NoSummarizer),
            Arc::new(EchoProvider),
            vec![],
            ApprovalGate::new(vec![]),
            Arc::new(crate::approval_channel::LoggingApprovalChannel),
            Duration::from_secs(5),
            false,
            40,
            Arc::new(crate::post_action::LoggingPostActionSink),
        ));

        let mut roles = HashMap::new();
        roles.insert(
            name.to_string(),
            RoleConfig {
                soul_file: None,
                model: "test-model".to_string(),
                description: String::new(),
                permission_mode: Default::default(),
                trust_level: 1,
                tool_policy: ToolPolicyConfig::default(),
            },
        );

        DispatchSink::new(
            dispatcher,
            Arc::new(RoleRegistry::new(roles)),
            name.to_string(),
            CancellationToken::new(),
        )
    }

    #[tokio::test]
    async fn task_sink_submit_returns_immediately_and_runs_in_the_background() {
        let sink = sink_with_role("coordinator");
        let task = Task::new("hi", "webhook:gh");
        let id = TaskSink::submit(&sink, task.clone()).await;
        assert_eq!(id, task.id);
    }

    #[tokio::test]
    async fn job_sink_submit_falls_back_for_an_unknown_role() {
        let sink = sink_with_role("coordinator");
        let mut task = Task::new("do it", "cron");
        task.role = Some("ghost-role".to_string());
        let id = JobSink::submit(&sink, task.clone()).await;
        assert_eq!(id, task.id);
    }
}
