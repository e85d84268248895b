//! The generic inbound pipeline: every concrete `Channel` adapter feeds its
//! messages through [`handle_inbound`], which implements spec §4.6 steps
//! 1-8. Channel-specific formatting stays in the `Channel` impl (mention
//! syntax, platform message limits); everything else — dedup, classification,
//! commands, routing, dispatch, progress rendering, completion — lives here
//! once. Mirrors `skynet-agent::pipeline::MessageContext`'s split: the
//! shared pipeline owns control flow, the channel supplies only formatting.

use std::collections::HashSet;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use tetora_core::types::{
    PermissionMode, Source, SseEvent, SseEventType, Task, TaskId, TaskResult, TaskStatus,
};
use tetora_events::EventBroker;
use tetora_router::RouteOrigin;
use tetora_sessions::SessionKey;

use crate::channel::Channel;
use crate::command::{ApproveDecision, Command};
use crate::dedup::Deduplicator;
use crate::error::ChannelError;
use crate::mention::{classify_message, strip_mention, MessageClass};
use crate::progress::ProgressView;
use crate::runtime::ChannelRuntime;
use crate::types::{InboundMessage, MessageRef, OutboundMessage};

/// Per-adapter settings, usually built once from `ChannelAdapterConfig`.
pub struct AdapterConfig {
    pub interactive: bool,
    pub default_role: String,
    pub mention_token: Option<String>,
    pub allowed_channel_ids: HashSet<String>,
    pub progress_enabled: bool,
    pub progress_refresh: Duration,
}

impl From<&tetora_core::config::ChannelAdapterConfig> for AdapterConfig {
    fn from(c: &tetora_core::config::ChannelAdapterConfig) -> Self {
        Self {
            interactive: c.interactive,
            default_role: c.default_role.clone().unwrap_or_else(|| "coordinator".to_string()),
            mention_token: c.mention_token.clone(),
            allowed_channel_ids: c.allowed_channel_ids.iter().cloned().collect(),
            progress_enabled: c.progress_enabled,
            progress_refresh: Duration::from_millis(c.progress_refresh_ms),
        }
    }
}

struct InFlight {
    task_id: TaskId,
    cancel: CancellationToken,
}

/// Shared, per-adapter state the generic loop needs across messages: the
/// dedup set and a table of currently-running tasks keyed by session, so
/// `!cancel` can find "the task this conversation is waiting on" without
/// the caller needing to track task ids themselves.
pub struct AdapterState {
    dedup: Deduplicator,
    inflight: DashMap<String, InFlight>,
}

impl AdapterState {
    pub fn new(dedup: Deduplicator) -> Self {
        Self { dedup, inflight: DashMap::new() }
    }
}

impl Default for AdapterState {
    fn default() -> Self {
        Self::new(Deduplicator::with_default_ttl())
    }
}

/// Run one inbound message through the full spec §4.6 pipeline. Errors are
/// channel/runtime failures (e.g. the session store is unreachable); a
/// message that's simply ignored (duplicate, unaddressed, empty after
/// mention stripping) returns `Ok(())` having done nothing.
pub async fn handle_inbound<C, R>(
    channel: &C,
    runtime: &R,
    events: &EventBroker,
    config: &AdapterConfig,
    state: &AdapterState,
    msg: InboundMessage,
) -> Result<(), ChannelError>
where
    C: Channel,
    R: ChannelRuntime,
{
    if !state.dedup.check(&msg.external_message_id) {
        debug!(id = %msg.external_message_id, "dropping duplicate inbound message");
        return Ok(());
    }

    let channel_allowed = config.allowed_channel_ids.contains(&msg.channel_id);
    let class = classify_message(msg.is_dm, msg.mentions_bot, channel_allowed);
    if class == MessageClass::Ignored {
        return Ok(());
    }

    let Some(text) = strip_mention(&msg.content, config.mention_token.as_deref()) else {
        return Ok(());
    };

    let session_key = SessionKey::new(channel.name(), msg.channel_id.clone(), Some(msg.sender_id.clone()));

    match crate::command::parse_command(&text) {
        Some(Command::Status) => reply_status(channel, state, &session_key, &msg).await,
        Some(Command::Cancel) => reply_cancel(channel, state, &session_key, &msg).await,
        Some(Command::New) => reply_new(channel, runtime, &session_key, &msg).await,
        Some(Command::Approve { id, decision }) => {
            reply_approve(channel, runtime, &id, decision, &msg).await
        }
        // `!ask` skips C3 routing and uses the session's existing role.
        Some(Command::Ask(body)) => {
            run_task(channel, runtime, events, config, state, &session_key, &msg, body, true).await
        }
        // Plain free text goes through C3 routing.
        None => run_task(channel, runtime, events, config, state, &session_key, &msg, text, false).await,
    }
}

async fn reply_status<C: Channel>(
    channel: &C,
    state: &AdapterState,
    session_key: &SessionKey,
    msg: &InboundMessage,
) -> Result<(), ChannelError> {
    let body = match state.inflight.get(&session_key.format()) {
        Some(entry) => format!("task {} is running", entry.task_id.short()),
        None => "no task is currently running for this conversation".to_string(),
    };
    channel.send(&OutboundMessage::plain(msg.channel_id.clone(), body)).await?;
    Ok(())
}

async fn reply_cancel<C: Channel>(
    channel: &C,
    state: &AdapterState,
    session_key: &SessionKey,
    msg: &InboundMessage,
) -> Result<(), ChannelError> {
    let body = match state.inflight.get(&session_key.format()) {
        Some(entry) => {
            entry.cancel.cancel();
            "cancelling the running task".to_string()
        }
        None => "no task is currently running for this conversation".to_string(),
    };
    channel.send(&OutboundMessage::plain(msg.channel_id.clone(), body)).await?;
    Ok(())
}

async fn reply_new<C: Channel, R: ChannelRuntime>(
    channel: &C,
    runtime: &R,
    session_key: &SessionKey,
    msg: &InboundMessage,
) -> Result<(), ChannelError> {
    let body = match runtime.archive_session(session_key).await {
        Ok(()) => "started a new session".to_string(),
        Err(e) => {
            warn!(error = %e, "failed to archive session for !new");
            "couldn't start a new session".to_string()
        }
    };
    channel.send(&OutboundMessage::plain(msg.channel_id.clone(), body)).await?;
    Ok(())
}

async fn reply_approve<C: Channel, R: ChannelRuntime>(
    channel: &C,
    runtime: &R,
    id: &str,
    decision: ApproveDecision,
    msg: &InboundMessage,
) -> Result<(), ChannelError> {
    match decision {
        ApproveDecision::Approve => runtime.resolve_approval(id, true).await,
        ApproveDecision::Reject => runtime.resolve_approval(id, false).await,
        ApproveDecision::Always => runtime.resolve_approval_always(id).await,
    }
    channel.send(&OutboundMessage::plain(msg.channel_id.clone(), format!("recorded your decision for {id}"))).await?;
    Ok(())
}

/// Free-text path: spec §4.6 step 5-8.
#[allow(clippy::too_many_arguments)]
async fn run_task<C, R>(
    channel: &C,
    runtime: &R,
    events: &EventBroker,
    config: &AdapterConfig,
    state: &AdapterState,
    session_key: &SessionKey,
    msg: &InboundMessage,
    body: String,
    skip_routing: bool,
) -> Result<(), ChannelError>
where
    C: Channel,
    R: ChannelRuntime,
{
    let task_id = TaskId::new();
    events.publish(SseEvent::new(
        SseEventType::TaskReceived,
        task_id.clone(),
        serde_json::json!({"channel": channel.name()}),
    ));

    let origin = RouteOrigin {
        channel: channel.name().to_string(),
        channel_id: Some(msg.channel_id.clone()),
        user_id: Some(msg.sender_id.clone()),
        guild_id: None,
    };

    let role_key = if skip_routing {
        config.default_role.clone()
    } else {
        let role = runtime.route(&body, &origin).await;
        events.publish(SseEvent::new(
            SseEventType::TaskRouting,
            task_id.clone(),
            serde_json::json!({"role": role}),
        ));
        role
    };

    let session = runtime.resolve_session(session_key, &role_key).await?;
    let role_key = if skip_routing { session.role.clone() } else { role_key };

    let source = Source::new(format!("route:{}", channel.name()));
    let context_prompt = runtime.context_prompt(&session, &body, &source).await?;

    let mut task = Task::new(context_prompt, source);
    task.id = task_id.clone();
    task.role = Some(role_key.clone());
    task.session_id = Some(tetora_core::types::SessionId::from(session.id.as_str()));
    if !config.interactive {
        task.permission_mode = PermissionMode::BypassPermissions;
    }

    let cancel = CancellationToken::new();
    state.inflight.insert(session_key.format(), InFlight { task_id: task_id.clone(), cancel: cancel.clone() });

    let result = run_with_progress(channel, runtime, events, config, task, &role_key, cancel).await;

    state.inflight.remove(&session_key.format());
    deliver_completion(channel, msg, &role_key, &task_id, &result).await
}

async fn run_with_progress<C, R>(
    channel: &C,
    runtime: &R,
    events: &EventBroker,
    config: &AdapterConfig,
    task: Task,
    role_key: &str,
    cancel: CancellationToken,
) -> TaskResult
where
    C: Channel,
    R: ChannelRuntime,
{
    let task_id = task.id.clone();
    let (mut progress_rx, _sub) = events.subscribe(task_id.clone());
    let dispatch_fut = runtime.dispatch(task, role_key, cancel);
    tokio::pin!(dispatch_fut);

    let mut view = ProgressView::new();
    let mut progress_ref: Option<MessageRef> = None;
    let recipient = task_id.as_str().to_string();

    loop {
        tokio::select! {
            result = &mut dispatch_fut => return result,
            maybe_event = progress_rx.recv() => {
                let Some(event) = maybe_event else { continue };
                view.on_event(&event);
                if config.progress_enabled && view.should_refresh(Instant::now(), config.progress_refresh) {
                    let rendered = view.render(channel.max_message_len());
                    progress_ref = render_progress(channel, &recipient, progress_ref, &rendered).await;
                    view.mark_rendered();
                }
            }
        }
    }
}

async fn render_progress<C: Channel>(
    channel: &C,
    recipient: &str,
    progress_ref: Option<MessageRef>,
    rendered: &str,
) -> Option<MessageRef> {
    match progress_ref {
        Some(r) => {
            if channel.edit(&r, rendered).await.is_ok() {
                Some(r)
            } else {
                None
            }
        }
        None => channel.send(&OutboundMessage::plain(recipient, rendered)).await.ok(),
    }
}

/// spec §4.6 step 7: edit the progress message in place if the final output
/// fits in one platform message, otherwise delete it and post the output as
/// word/newline-boundary chunks, always followed by a compact metadata footer.
async fn deliver_completion<C: Channel>(
    channel: &C,
    msg: &InboundMessage,
    role_key: &str,
    task_id: &TaskId,
    result: &TaskResult,
) -> Result<(), ChannelError> {
    let body = if result.status == TaskStatus::Success { result.output.clone() } else { format!("error: {}", result.error) };
    let footer = format!(
        "role: {} | status: {} | cost: ${:.4} | duration: {}ms | id: {}",
        role_key, result.status, result.cost_usd, result.duration_ms, task_id.short()
    );
    let full = format!("{body}\n\n{footer}");
    let max_len = channel.max_message_len();

    if full.chars().count() <= max_len {
        channel.send(&OutboundMessage::plain(msg.channel_id.clone(), full)).await?;
    } else {
        for chunk in chunk_text(&body, max_len) {
            channel.send(&OutboundMessage::plain(msg.channel_id.clone(), chunk)).await?;
        }
        channel.send(&OutboundMessage::plain(msg.channel_id.clone(), footer)).await?;
    }

    info!(task_id = %task_id, status = %result.status, "delivered task completion");
    Ok(())
}

/// Split `text` into chunks no longer than `max_len`, breaking on the last
/// newline or space before the limit when one exists so words aren't torn
/// mid-token.
fn chunk_text(text: &str, max_len: usize) -> Vec<String> {
    if max_len == 0 {
        return vec![text.to_string()];
    }
    let chars: Vec<char> = text.chars().collect();
    let mut chunks = Vec::new();
    let mut start = 0;

    while start < chars.len() {
        let end = (start + max_len).min(chars.len());
        if end == chars.len() {
            chunks.push(chars[start..end].iter().collect());
            break;
        }
        let window = &chars[start..end];
        let split_at = window
            .iter()
            .rposition(|c| *c == '\n' || *c == ' ')
            .map(|i| i + 1)
            .unwrap_or(window.len());
        let split_at = if split_at == 0 { window.len() } else { split_at };
        chunks.push(chars[start..start + split_at].iter().collect());
        start += split_at;
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_is_a_single_chunk() {
        assert_eq!(chunk_text("hello", 100), vec!["hello".to_string()]);
    }

    #[test]
    fn long_text_splits_on_word_boundaries() {
        let text = "one two three four five six seven eight";
        let chunks = chunk_text(text, 12);
        assert!(chunks.iter().all(|c| c.chars().count() <= 12));
        assert_eq!(chunks.join(""), text);
    }

    #[test]
    fn unbroken_run_longer_than_max_len_hard_splits() {
        let text = "a".repeat(30);
        let chunks = chunk_text(&text, 10);
        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|c| c.chars().count() == 10));
    }
}
