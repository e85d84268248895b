//! Central shared state, passed as `Arc<AppState>` to every Axum handler —
//! same role as `skynet-gateway::app::AppState`, rebuilt around the C1-C8
//! components instead of the teacher's agent/memory/terminal stack.

use std::sync::Arc;

use tetora_approval::ApprovalGate;
use tetora_core::config::TetoraConfig;
use tetora_dispatcher::Dispatcher;
use tetora_events::EventBroker;
use tetora_router::Router;
use tetora_scheduler::SchedulerHandle;
use tetora_sessions::SessionManager;
use tetora_slots::SlotGuard;
use tokio_util::sync::CancellationToken;

use crate::board::TaskBoard;
use crate::roles::RoleRegistry;
use crate::sink::DispatchSink;

pub struct AppState {
    pub config: TetoraConfig,
    pub dispatcher: Arc<Dispatcher>,
    pub router: Router,
    pub roles: Arc<RoleRegistry>,
    pub events: EventBroker,
    pub sessions: Arc<SessionManager>,
    pub approval_gate: ApprovalGate,
    pub slots: SlotGuard,
    pub board: TaskBoard,
    pub scheduler: SchedulerHandle,
    pub sink: Arc<DispatchSink>,
    pub shutdown: CancellationToken,
}

impl AppState {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: TetoraConfig,
        dispatcher: Arc<Dispatcher>,
        router: Router,
        roles: Arc<RoleRegistry>,
        events: EventBroker,
        sessions: Arc<SessionManager>,
        approval_gate: ApprovalGate,
        slots: SlotGuard,
        scheduler: SchedulerHandle,
        sink: Arc<DispatchSink>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            config,
            dispatcher,
            router,
            roles,
            events,
            sessions,
            approval_gate,
            slots,
            board: TaskBoard::new(),
            scheduler,
            sink,
            shutdown,
        }
    }
}
