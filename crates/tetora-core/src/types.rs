//! Shared identifiers and value types used across every Tetora crate.
//!
//! Mirrors the newtype-over-`Uuid` style used throughout the codebase: each
//! identifier is its own type so a `TaskId` can never be passed where a
//! `SessionId` is expected, even though both are strings under the hood.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

/// Opaque task identifier, generated at the entry point (UUIDv7 — time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(pub String);

impl TaskId {
    pub fn new() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Last 8 hex characters, used in compact channel footers (spec §4.6 step 7).
    pub fn short(&self) -> &str {
        let len = self.0.len();
        &self.0[len.saturating_sub(8)..]
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Opaque session identifier (UUIDv7).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// How a task is permitted to affect the filesystem / tool surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PermissionMode {
    #[default]
    Default,
    AcceptEdits,
    Plan,
    BypassPermissions,
}

/// Terminal (and in-flight) states of a task, per spec §4.5's state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Success,
    Error,
    Timeout,
    Cancelled,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Success | TaskStatus::Error | TaskStatus::Timeout | TaskStatus::Cancelled
        )
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Success => "success",
            TaskStatus::Error => "error",
            TaskStatus::Timeout => "timeout",
            TaskStatus::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

/// Opaque string encoding a task's origin, e.g. `route:discord`, `cron`,
/// `workflow:ingest`. Classification drives slot-guard admission (C2) and
/// the session complexity classifier (C4).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Source(pub String);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceClass {
    Interactive,
    NonInteractive,
}

/// Non-interactive source prefixes, per spec §4.2.
const NON_INTERACTIVE_PREFIXES: &[&str] = &[
    "cron",
    "workflow",
    "dispatch",
    "taskboard",
    "queue",
    "agent_dispatch",
    "reflection",
];

/// Source prefixes that are always interactive regardless of the
/// non-interactive list above (chat/route origins, `ask`, `chat`).
const INTERACTIVE_PREFIXES: &[&str] = &["route", "ask", "chat"];

impl Source {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Classify this source per spec §4.2. Interactive prefixes are checked
    /// first so `route:cron-dashboard` (hypothetical) still reads as
    /// interactive — the explicit allow-list wins over the deny-list.
    pub fn classify(&self) -> SourceClass {
        let head = self.0.split(':').next().unwrap_or(&self.0);
        if INTERACTIVE_PREFIXES.contains(&head) {
            return SourceClass::Interactive;
        }
        if NON_INTERACTIVE_PREFIXES.contains(&head) {
            return SourceClass::NonInteractive;
        }
        // Unknown sources default to interactive: the safer failure mode is
        // "never block an unrecognized caller", not "silently rate-limit it".
        SourceClass::Interactive
    }

    pub fn is_interactive(&self) -> bool {
        self.classify() == SourceClass::Interactive
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Source {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A fully populated unit of work, as described in spec §3.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub prompt: String,
    pub role: Option<String>,
    pub model: Option<String>,
    pub provider: Option<String>,
    pub permission_mode: PermissionMode,
    /// Non-negative USD ceiling for this task.
    pub budget: f64,
    #[serde(with = "duration_ms")]
    pub timeout: Duration,
    pub source: Source,
    pub parent_id: Option<TaskId>,
    pub depth: u32,
    pub session_id: Option<SessionId>,
    /// Expanded from role soul file + skills + knowledge by the caller.
    pub system_prompt: Option<String>,
}

impl Task {
    /// Construct a root task (depth 0, no parent) with otherwise-default
    /// optional fields. Callers fill in role/model/budget as needed.
    pub fn new(prompt: impl Into<String>, source: impl Into<Source>) -> Self {
        Self {
            id: TaskId::new(),
            prompt: prompt.into(),
            role: None,
            model: None,
            provider: None,
            permission_mode: PermissionMode::default(),
            budget: 0.0,
            timeout: Duration::from_secs(600),
            source: source.into(),
            parent_id: None,
            depth: 0,
            session_id: None,
            system_prompt: None,
        }
    }

    /// Build a child task inheriting depth+1 and the parent's id.
    pub fn child(&self, prompt: impl Into<String>, source: impl Into<Source>) -> Self {
        let mut t = Task::new(prompt, source);
        t.parent_id = Some(self.id.clone());
        t.depth = self.depth + 1;
        t.session_id = self.session_id.clone();
        t
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let ms = u64::deserialize(d)?;
        Ok(Duration::from_millis(ms))
    }
}

/// Outcome of a completed task, per spec §3.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult {
    pub status: TaskStatus,
    pub output: String,
    /// Empty on success.
    pub error: String,
    pub cost_usd: f64,
    pub tokens_in: u32,
    pub tokens_out: u32,
    pub model: String,
    pub duration_ms: u64,
    pub output_file: Option<String>,
}

impl TaskResult {
    pub fn success(output: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            status: TaskStatus::Success,
            output: output.into(),
            error: String::new(),
            cost_usd: 0.0,
            tokens_in: 0,
            tokens_out: 0,
            model: model.into(),
            duration_ms: 0,
            output_file: None,
        }
    }

    pub fn error(reason: impl Into<String>) -> Self {
        Self {
            status: TaskStatus::Error,
            output: String::new(),
            error: reason.into(),
            cost_usd: 0.0,
            tokens_in: 0,
            tokens_out: 0,
            model: String::new(),
            duration_ms: 0,
            output_file: None,
        }
    }
}

/// How a router arrived at its decision (spec §3 `RouteResult`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteMethod {
    Binding,
    Keyword,
    Llm,
    Default,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteConfidence {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteResult {
    pub role: String,
    pub method: RouteMethod,
    pub confidence: RouteConfidence,
}

/// SSE event envelope shared by the dashboard stream and channel progress
/// subscribers (spec §3 `SSE event`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SseEvent {
    #[serde(rename = "type")]
    pub event_type: SseEventType,
    pub task_id: TaskId,
    pub session_id: Option<SessionId>,
    pub data: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SseEventType {
    TaskReceived,
    TaskRouting,
    TaskProcessing,
    OutputChunk,
    ToolCall,
    ToolResult,
    Completed,
    Error,
    SessionMessage,
    SlotPressure,
}

impl SseEvent {
    pub fn new(event_type: SseEventType, task_id: TaskId, data: serde_json::Value) -> Self {
        Self {
            event_type,
            task_id,
            session_id: None,
            data,
        }
    }

    pub fn with_session(mut self, session_id: SessionId) -> Self {
        self.session_id = Some(session_id);
        self
    }

    /// Render as a `text/event-stream` frame: `event: <type>\ndata: <json>\n\n`.
    pub fn to_sse_frame(&self) -> String {
        let type_str = match self.event_type {
            SseEventType::TaskReceived => "task_received",
            SseEventType::TaskRouting => "task_routing",
            SseEventType::TaskProcessing => "task_processing",
            SseEventType::OutputChunk => "output_chunk",
            SseEventType::ToolCall => "tool_call",
            SseEventType::ToolResult => "tool_result",
            SseEventType::Completed => "completed",
            SseEventType::Error => "error",
            SseEventType::SessionMessage => "session_message",
            SseEventType::SlotPressure => "slot_pressure",
        };
        format!("event: {}\ndata: {}\n\n", type_str, self.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_classification_matches_spec_table() {
        assert_eq!(Source::new("route:discord").classify(), SourceClass::Interactive);
        assert_eq!(Source::new("ask").classify(), SourceClass::Interactive);
        assert_eq!(Source::new("chat").classify(), SourceClass::Interactive);
        assert_eq!(Source::new("cron").classify(), SourceClass::NonInteractive);
        assert_eq!(Source::new("workflow:ingest").classify(), SourceClass::NonInteractive);
        assert_eq!(Source::new("dispatch").classify(), SourceClass::NonInteractive);
        assert_eq!(Source::new("taskboard").classify(), SourceClass::NonInteractive);
        assert_eq!(Source::new("queue").classify(), SourceClass::NonInteractive);
        assert_eq!(Source::new("agent_dispatch").classify(), SourceClass::NonInteractive);
        assert_eq!(Source::new("reflection").classify(), SourceClass::NonInteractive);
    }

    #[test]
    fn unknown_source_defaults_interactive() {
        assert_eq!(Source::new("mystery").classify(), SourceClass::Interactive);
    }

    #[test]
    fn task_id_short_is_last_eight_hex_chars() {
        let id = TaskId::from("0000000000000000deadbeef");
        assert_eq!(id.short(), "deadbeef");
    }

    #[test]
    fn child_task_inherits_depth_and_parent() {
        let parent = Task::new("root prompt", "route:discord");
        let child = parent.child("follow-up", "route:discord");
        assert_eq!(child.depth, 1);
        assert_eq!(child.parent_id, Some(parent.id));
    }
}
