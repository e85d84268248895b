//! C5 — the central worker. Generalizes
//! `skynet-agent/src/pipeline/process.rs::process_message_non_streaming`'s
//! shape (build request → run the tool loop → persist turns → spawn
//! compaction → return) into the full state machine spec §4.5 describes:
//! defaults fill → depth check → slot acquire → register → per-task
//! deadline → provider call → terminal status → best-effort post-actions →
//! release.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tetora_agent::provider::{ChatRequest, LlmProvider, Message as ProviderMessage, ProviderError, Role as ProviderRole};
use tetora_agent::tool::{Tool, ToolResult};
use tetora_agent::tool_loop::{run_tool_loop, EventSink};
use tetora_approval::{ApprovalChannel, ApprovalGate};
use tetora_core::config::{DispatcherConfig, RoleConfig};
use tetora_core::types::{SseEvent, SseEventType, Task, TaskResult, TaskStatus};
use tetora_events::EventBroker;
use tetora_sessions::{CompactionSummarizer, MessageRole, SessionManager};
use tetora_slots::{SlotError, SlotGuard};
use tokio_util::sync::CancellationToken;
use tracing::{error, instrument, warn};

use crate::approval_tool::ApprovalGatedTool;
use crate::post_action::PostActionSink;
use crate::running::RunningTable;

/// Thin adapter so a pool of `Arc<dyn Tool>` (shared across tasks) can be
/// handed to `run_tool_loop`, which takes owned `Box<dyn Tool>`.
struct ArcTool(Arc<dyn Tool>);

#[async_trait]
impl Tool for ArcTool {
    fn name(&self) -> &str {
        self.0.name()
    }
    fn description(&self) -> &str {
        self.0.description()
    }
    fn input_schema(&self) -> serde_json::Value {
        self.0.input_schema()
    }
    fn requires_sandbox(&self) -> bool {
        self.0.requires_sandbox()
    }
    async fn execute(&self, input: serde_json::Value) -> ToolResult {
        self.0.execute(input).await
    }
}

pub struct Dispatcher {
    config: DispatcherConfig,
    slots: SlotGuard,
    events: EventBroker,
    sessions: Arc<SessionManager>,
    summarizer: Arc<dyn CompactionSummarizer>,
    provider: Arc<dyn LlmProvider>,
    base_tools: Vec<Arc<dyn Tool>>,
    approval_gate: ApprovalGate,
    approval_channel: Arc<dyn ApprovalChannel>,
    approval_timeout: Duration,
    sandbox_available: bool,
    compact_threshold: i64,
    running: RunningTable,
    post_action_sink: Arc<dyn PostActionSink>,
}

#[allow(clippy::too_many_arguments)]
impl Dispatcher {
    pub fn new(
        config: DispatcherConfig,
        slots: SlotGuard,
        events: EventBroker,
        sessions: Arc<SessionManager>,
        summarizer: Arc<dyn CompactionSummarizer>,
        provider: Arc<dyn LlmProvider>,
        base_tools: Vec<Arc<dyn Tool>>,
        approval_gate: ApprovalGate,
        approval_channel: Arc<dyn ApprovalChannel>,
        approval_timeout: Duration,
        sandbox_available: bool,
        compact_threshold: i64,
        post_action_sink: Arc<dyn PostActionSink>,
    ) -> Self {
        Self {
            config,
            slots,
            events,
            sessions,
            summarizer,
            provider,
            base_tools,
            approval_gate,
            approval_channel,
            approval_timeout,
            sandbox_available,
            compact_threshold,
            running: RunningTable::new(),
            post_action_sink,
        }
    }

    pub fn running(&self) -> &RunningTable {
        &self.running
    }

    /// Run one task to a terminal state. `caller_cancel` is the
    /// process/adapter-level context this task's own deadline is joined
    /// with (spec §5 "any-cancels-all").
    #[instrument(skip(self, task, role, caller_cancel), fields(task_id = %task.id, source = %task.source))]
    pub async fn dispatch(&self, mut task: Task, role: &RoleConfig, caller_cancel: CancellationToken) -> TaskResult {
        let start = Instant::now();
        self.apply_defaults(&mut task);

        if task.depth > self.config.max_depth {
            warn!(depth = task.depth, max = self.config.max_depth, "depth exceeded, refusing task");
            return TaskResult::error("depth_exceeded");
        }

        let permit = match self.slots.acquire(&task.source, &caller_cancel).await {
            Ok(permit) => permit,
            Err(SlotError::Cancelled) => {
                return terminal(TaskStatus::Cancelled, "cancelled while waiting for a slot", start);
            }
        };

        let task_cancel = caller_cancel.child_token();
        self.running.register(task.clone(), task_cancel.clone());
        self.events.publish(SseEvent::new(
            SseEventType::TaskProcessing,
            task.id.clone(),
            serde_json::json!({
                "source": task.source.as_str(),
                "pressure_warning": permit.pressure_warning,
            }),
        ));

        let result = self.run_with_deadline(&task, role, &task_cancel).await;

        self.run_post_actions(&task, &result).await;

        self.running.remove(&task.id);
        let final_event = match result.status {
            TaskStatus::Success => SseEventType::Completed,
            _ => SseEventType::Error,
        };
        self.events.publish(SseEvent::new(
            final_event,
            task.id.clone(),
            serde_json::json!({
                "status": result.status.to_string(),
                "cost_usd": result.cost_usd,
                "duration_ms": result.duration_ms,
            }),
        ));
        self.events.unsubscribe_all(&task.id);
        drop(permit);

        result
    }

    fn apply_defaults(&self, task: &mut Task) {
        if task.model.is_none() {
            task.model = Some(self.config.default_model.clone());
        }
        if task.provider.is_none() {
            task.provider = Some("default".to_string());
        }
        if task.budget <= 0.0 {
            task.budget = self.config.default_budget_usd;
        }
        // `Task::new` hardcodes a 600s timeout; treat an unmodified value as
        // "unset" so operators can change the configured default without
        // every caller needing to know about it.
        if task.timeout == Duration::from_secs(600) {
            task.timeout = Duration::from_secs(self.config.default_timeout_secs);
        }
    }

    async fn run_with_deadline(&self, task: &Task, role: &RoleConfig, cancel: &CancellationToken) -> TaskResult {
        let start = Instant::now();
        let sink = EventSink { broker: &self.events, task_id: &task.id };

        let tools = self.build_tool_list(role);
        let system = task.system_prompt.clone().unwrap_or_default();
        let request = ChatRequest {
            model: task.model.clone().unwrap_or_else(|| self.config.default_model.clone()),
            system,
            messages: vec![ProviderMessage { role: ProviderRole::User, content: task.prompt.clone() }],
            max_tokens: 4096,
            tools: tetora_agent::tool::to_definitions(&tools),
            raw_messages: None,
        };

        let loop_future = run_tool_loop(
            self.provider.as_ref(),
            request,
            &tools,
            &role.tool_policy,
            self.sandbox_available,
            Some(&sink),
        );

        tokio::select! {
            _ = cancel.cancelled() => {
                terminal(TaskStatus::Cancelled, "task cancelled", start)
            }
            _ = tokio::time::sleep(task.timeout) => {
                terminal(TaskStatus::Timeout, "task exceeded its deadline", start)
            }
            outcome = loop_future => {
                match outcome {
                    Ok(response) => {
                        let cost_usd = self.price_tokens(response.tokens_in, response.tokens_out);
                        if task.budget > 0.0 && cost_usd > task.budget {
                            let mut result = TaskResult::error("budget_exceeded");
                            result.cost_usd = cost_usd;
                            result.tokens_in = response.tokens_in;
                            result.tokens_out = response.tokens_out;
                            result.model = response.model;
                            result.duration_ms = start.elapsed().as_millis() as u64;
                            return result;
                        }
                        let mut result = TaskResult::success(response.content, response.model);
                        result.cost_usd = cost_usd;
                        result.tokens_in = response.tokens_in;
                        result.tokens_out = response.tokens_out;
                        result.duration_ms = start.elapsed().as_millis() as u64;
                        result
                    }
                    Err(err) => classify_provider_error(err, start),
                }
            }
        }
    }

    /// Prices a completed turn from its token counts (spec §4.5 step 6:
    /// "success — provider returned output ≤ budget"). Zero when
    /// `cost_per_1k_*_tokens_usd` is left at its default, so an
    /// unconfigured deployment never fails a task on budget alone.
    fn price_tokens(&self, tokens_in: u32, tokens_out: u32) -> f64 {
        (tokens_in as f64 / 1000.0) * self.config.cost_per_1k_input_tokens_usd
            + (tokens_out as f64 / 1000.0) * self.config.cost_per_1k_output_tokens_usd
    }

    fn build_tool_list(&self, role: &RoleConfig) -> Vec<Box<dyn Tool>> {
        self.base_tools
            .iter()
            .map(|tool| -> Box<dyn Tool> {
                if role.tool_policy.approval_required.iter().any(|t| t == tool.name()) {
                    Box::new(ApprovalGatedTool::new(
                        Arc::clone(tool),
                        self.approval_gate.clone(),
                        Arc::clone(&self.approval_channel),
                        self.approval_timeout,
                    ))
                } else {
                    Box::new(ArcTool(Arc::clone(tool)))
                }
            })
            .collect()
    }

    /// Best-effort, never fatal: a failure here is logged, not propagated —
    /// the `TaskResult` returned to the caller is already final.
    async fn run_post_actions(&self, task: &Task, result: &TaskResult) {
        if let Some(session_id) = &task.session_id {
            let sid = session_id.as_str();
            if let Err(e) = self.sessions.append(
                sid,
                MessageRole::User,
                &task.prompt,
                Some(task.id.as_str()),
                None,
                None,
                None,
                None,
            ) {
                warn!(error = %e, "post-action: failed to record user turn");
            }
            if result.status == TaskStatus::Success {
                if let Err(e) = self.sessions.append(
                    sid,
                    MessageRole::Assistant,
                    &result.output,
                    Some(task.id.as_str()),
                    Some(&result.model),
                    Some(result.cost_usd),
                    Some(result.tokens_in),
                    Some(result.tokens_out),
                ) {
                    warn!(error = %e, "post-action: failed to record assistant turn");
                }
            }

            let sessions = Arc::clone(&self.sessions);
            let summarizer = Arc::clone(&self.summarizer);
            let threshold = self.compact_threshold;
            let sid_owned = sid.to_string();
            tokio::spawn(async move {
                if let Err(e) = sessions.maybe_compact(&sid_owned, threshold, summarizer.as_ref()).await {
                    warn!(error = %e, "background compaction failed");
                }
            });
        }

        self.post_action_sink.on_task_complete(task, result).await;
    }
}

/// Build a non-success terminal `TaskResult` (cancelled/timeout) with the
/// elapsed duration filled in.
fn terminal(status: TaskStatus, message: &str, start: Instant) -> TaskResult {
    let mut result = TaskResult::error(message);
    result.status = status;
    result.duration_ms = start.elapsed().as_millis() as u64;
    result
}

fn classify_provider_error(err: ProviderError, start: Instant) -> TaskResult {
    error!(error = %err, "provider call failed");
    let mut result = TaskResult::error(err.to_string());
    result.duration_ms = start.elapsed().as_millis() as u64;
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tetora_agent::provider::{ChatResponse, ToolCall};
    use tetora_core::config::SlotConfig;
    use tetora_core::types::SessionId;
    use tetora_sessions::SessionKey;

    struct FixedSummarizer;
    #[async_trait]
    impl CompactionSummarizer for FixedSummarizer {
        async fn summarize(&self, _session_id: &str, _transcript: &str) -> Option<String> {
            None
        }
    }

    struct ScriptedProvider {
        // When true, the first call returns a tool_use response and the
        // second (and later) calls return the final answer; when false,
        // every call returns the final answer immediately.
        respond_tool_use: bool,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl LlmProvider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }
        async fn send(&self, _req: &ChatRequest) -> Result<ChatResponse, ProviderError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.respond_tool_use && n == 0 {
                Ok(ChatResponse {
                    content: String::new(),
                    model: "test-model".into(),
                    tokens_in: 5,
                    tokens_out: 2,
                    stop_reason: "tool_use".into(),
                    tool_calls: vec![ToolCall {
                        id: "c1".into(),
                        name: "noop".into(),
                        input: serde_json::json!({}),
                    }],
                })
            } else {
                Ok(ChatResponse {
                    content: "all done".into(),
                    model: "test-model".into(),
                    tokens_in: 5,
                    tokens_out: 2,
                    stop_reason: "end_turn".into(),
                    tool_calls: vec![],
                })
            }
        }
    }

    struct SlowProvider;
    #[async_trait]
    impl LlmProvider for SlowProvider {
        fn name(&self) -> &str {
            "slow"
        }
        async fn send(&self, _req: &ChatRequest) -> Result<ChatResponse, ProviderError> {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok(ChatResponse {
                content: "too late".into(),
                model: "test-model".into(),
                tokens_in: 0,
                tokens_out: 0,
                stop_reason: "end_turn".into(),
                tool_calls: vec![],
            })
        }
    }

    struct NoopTool;
    #[async_trait]
    impl Tool for NoopTool {
        fn name(&self) -> &str {
            "noop"
        }
        fn description(&self) -> &str {
            "does nothing"
        }
        fn input_schema(&self) -> serde_json::Value {
            serde_json::json!({})
        }
        async fn execute(&self, _input: serde_json::Value) -> ToolResult {
            ToolResult::success("ok")
        }
    }

    struct NullChannel;
    #[async_trait]
    impl ApprovalChannel for NullChannel {
        async fn send_request(&self, _request: &tetora_approval::ApprovalRequest) {}
    }

    fn role() -> RoleConfig {
        RoleConfig {
            soul_file: None,
            model: "test-model".into(),
            description: "test role".into(),
            permission_mode: Default::default(),
            trust_level: 1,
            tool_policy: Default::default(),
        }
    }

    fn dispatcher_with(provider: Arc<dyn LlmProvider>) -> Dispatcher {
        let conn = Connection::open_in_memory().unwrap();
        tetora_sessions::db::init_db(&conn).unwrap();
        let sessions = Arc::new(SessionManager::new(conn));

        Dispatcher::new(
            DispatcherConfig::default(),
            SlotGuard::new(tetora_slots::SlotGuardConfig::from(&SlotConfig::default()), EventBroker::new()),
            EventBroker::new(),
            sessions,
            Arc::new(FixedSummarizer),
            provider,
            vec![Arc::new(NoopTool)],
            ApprovalGate::new(vec![]),
            Arc::new(NullChannel),
            Duration::from_secs(5),
            false,
            40,
            Arc::new(crate::post_action::NoopPostActionSink),
        )
    }

    fn dispatcher(respond_tool_use: bool) -> Dispatcher {
        dispatcher_with(Arc::new(ScriptedProvider { respond_tool_use, calls: AtomicUsize::new(0) }))
    }

    fn dispatcher_with_pricing(cost_per_1k_input_tokens_usd: f64, cost_per_1k_output_tokens_usd: f64) -> Dispatcher {
        let conn = Connection::open_in_memory().unwrap();
        tetora_sessions::db::init_db(&conn).unwrap();
        let sessions = Arc::new(SessionManager::new(conn));

        Dispatcher::new(
            DispatcherConfig {
                cost_per_1k_input_tokens_usd,
                cost_per_1k_output_tokens_usd,
                ..DispatcherConfig::default()
            },
            SlotGuard::new(tetora_slots::SlotGuardConfig::from(&SlotConfig::default()), EventBroker::new()),
            EventBroker::new(),
            sessions,
            Arc::new(FixedSummarizer),
            Arc::new(ScriptedProvider { respond_tool_use: false, calls: AtomicUsize::new(0) }),
            vec![Arc::new(NoopTool)],
            ApprovalGate::new(vec![]),
            Arc::new(NullChannel),
            Duration::from_secs(5),
            false,
            40,
            Arc::new(crate::post_action::NoopPostActionSink),
        )
    }

    #[tokio::test]
    async fn successful_task_returns_success_with_output() {
        let d = dispatcher(false);
        let task = Task::new("hello", "route:discord");
        let result = d.dispatch(task, &role(), CancellationToken::new()).await;
        assert_eq!(result.status, TaskStatus::Success);
        assert_eq!(result.output, "all done");
        assert!(d.running().is_empty());
    }

    #[tokio::test]
    async fn depth_exceeding_max_short_circuits_before_any_provider_call() {
        let d = dispatcher(false);
        let mut task = Task::new("hello", "route:discord");
        task.depth = 10;
        let result = d.dispatch(task, &role(), CancellationToken::new()).await;
        assert_eq!(result.status, TaskStatus::Error);
        assert_eq!(result.error, "depth_exceeded");
    }

    #[tokio::test]
    async fn cancelling_before_completion_yields_cancelled_status() {
        let d = dispatcher(false);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let task = Task::new("hello", "route:discord");
        let result = d.dispatch(task, &role(), cancel).await;
        assert_eq!(result.status, TaskStatus::Cancelled);
    }

    #[tokio::test]
    async fn task_with_a_short_deadline_times_out_before_a_slow_provider_replies() {
        let d = dispatcher_with(Arc::new(SlowProvider));
        let mut task = Task::new("hello", "route:discord");
        task.timeout = Duration::from_millis(5);
        let result = d.dispatch(task, &role(), CancellationToken::new()).await;
        assert_eq!(result.status, TaskStatus::Timeout);
    }

    #[tokio::test]
    async fn post_actions_append_both_turns_to_the_session() {
        let d = dispatcher(false);
        let key = SessionKey::new("discord", "chan-1", None);
        let session = d.sessions.get_or_create(&key, "coordinator").unwrap();

        let mut task = Task::new("hello", "route:discord");
        task.session_id = Some(SessionId::from(session.id.as_str()));
        let result = d.dispatch(task, &role(), CancellationToken::new()).await;
        assert_eq!(result.status, TaskStatus::Success);

        let messages = d.sessions.recent_messages(&session.id, 10).unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, MessageRole::User);
        assert_eq!(messages[1].role, MessageRole::Assistant);
    }

    #[tokio::test]
    async fn running_table_is_empty_after_any_terminal_outcome() {
        let d = dispatcher(false);
        let task = Task::new("hello", "route:discord");
        let _ = d.dispatch(task, &role(), CancellationToken::new()).await;
        assert_eq!(d.running().len(), 0);
    }

    #[tokio::test]
    async fn tool_use_round_trip_reaches_a_terminal_success() {
        let d = dispatcher(true);
        let task = Task::new("hello", "route:discord");
        let result = d.dispatch(task, &role(), CancellationToken::new()).await;
        assert_eq!(result.status, TaskStatus::Success);
        assert_eq!(result.output, "all done");
    }

    #[tokio::test]
    async fn default_pricing_never_enforces_a_budget() {
        let d = dispatcher(false);
        let mut task = Task::new("hello", "route:discord");
        task.budget = 0.000001;
        let result = d.dispatch(task, &role(), CancellationToken::new()).await;
        assert_eq!(result.status, TaskStatus::Success);
        assert_eq!(result.cost_usd, 0.0);
    }

    #[tokio::test]
    async fn task_exceeding_its_budget_is_rejected_after_the_provider_responds() {
        let d = dispatcher_with_pricing(1.0, 1.0);
        let mut task = Task::new("hello", "route:discord");
        task.budget = 0.000001;
        let budget = task.budget;
        let result = d.dispatch(task, &role(), CancellationToken::new()).await;
        assert_eq!(result.status, TaskStatus::Error);
        assert_eq!(result.error, "budget_exceeded");
        assert!(result.cost_usd > budget);
        assert_eq!(result.tokens_in, 5);
        assert_eq!(result.tokens_out, 2);
    }

    #[tokio::test]
    async fn task_within_its_budget_still_succeeds() {
        let d = dispatcher_with_pricing(0.001, 0.001);
        let mut task = Task::new("hello", "route:discord");
        task.budget = 1.0;
        let budget = task.budget;
        let result = d.dispatch(task, &role(), CancellationToken::new()).await;
        assert_eq!(result.status, TaskStatus::Success);
        assert!(result.cost_usd > 0.0 && result.cost_usd < budget);
    }
}
