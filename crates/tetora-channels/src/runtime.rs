use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use tetora_core::types::{Source, Task, TaskResult};
use tetora_router::RouteOrigin;
use tetora_sessions::{Session, SessionKey};

use crate::error::ChannelError;

/// External collaborator giving the generic adapter loop access to
/// C3/C4/C5/C8 without this crate depending on any of those crates
/// directly — the gateway wires the real `Router`/`SessionManager`/
/// `Dispatcher`/`ApprovalGate` together at startup. Same decoupling shape
/// as `tetora_router::RoleClassifier` and `tetora_sessions::CompactionSummarizer`,
/// chosen here mainly for testability: exercising `handle_inbound` doesn't
/// require standing up a real dispatcher (provider, slots, sqlite, ...).
#[async_trait]
pub trait ChannelRuntime: Send + Sync {
    /// C3: resolve a role for this prompt/origin. Never fails.
    async fn route(&self, prompt: &str, origin: &RouteOrigin) -> String;

    /// C4: resolve or create the active session for `key`, bound to
    /// `default_role` if it doesn't exist yet.
    async fn resolve_session(&self, key: &SessionKey, default_role: &str) -> Result<Session, ChannelError>;

    /// C4: build the context-window-bounded prompt for this session.
    async fn context_prompt(&self, session: &Session, prompt: &str, source: &Source) -> Result<String, ChannelError>;

    /// C5: run a task to a terminal state.
    async fn dispatch(&self, task: Task, role_key: &str, cancel: CancellationToken) -> TaskResult;

    /// C4: archive the active session for `key` (the `!new` command).
    async fn archive_session(&self, key: &SessionKey) -> Result<(), ChannelError>;

    /// C8: resolve a pending approval request.
    async fn resolve_approval(&self, id: &str, approved: bool);

    /// C8: resolve a pending approval request and remember its tool as
    /// auto-approved for future requests (the `!approve <id> always`
    /// command). The tool name isn't known to the channel layer — only
    /// whatever sent the original approval prompt (the runtime's own
    /// `ApprovalChannel` implementation) knows it — so it's looked up
    /// internally from `id` alone.
    async fn resolve_approval_always(&self, id: &str);
}
