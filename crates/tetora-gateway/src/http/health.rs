use std::sync::Arc;

use axum::{extract::State, Json};
use serde_json::{json, Value};

use crate::state::AppState;

/// GET /health — liveness probe, returns slot pressure and in-flight work
/// instead of the teacher's `ws_clients`/`providers` pair, which have no
/// counterpart here.
pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "slots": {
            "capacity": state.config.slots.capacity,
            "active": state.slots.active(),
            "waiting": state.slots.waiting(),
        },
        "runningTasks": state.dispatcher.running().len(),
        "pendingApprovals": state.approval_gate.pending_count(),
    }))
}
