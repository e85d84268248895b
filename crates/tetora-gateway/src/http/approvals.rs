//! `POST /approvals/{id}` — the only way to resolve a pending C8 approval
//! request, per `crate::approval_channel::LoggingApprovalChannel`'s doc
//! comment. Body `{approved, always?}`; `always` additionally adds the
//! tool to the gate's auto-approval set.

use std::sync::Arc;

use axum::{extract::{Path, State}, Json};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ResolveApprovalRequest {
    pub approved: bool,
    #[serde(default)]
    pub always: bool,
    /// Required when `always` is set, since the auto-approval set is keyed
    /// by tool name, not approval id.
    pub tool: Option<String>,
}

pub async fn resolve_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<ResolveApprovalRequest>,
) -> Json<Value> {
    if req.always {
        if let Some(tool) = &req.tool {
            state.approval_gate.resolve_always(&id, tool);
            return Json(json!({ "status": "resolved", "always": true }));
        }
    }

    state.approval_gate.resolve(&id, req.approved);
    Json(json!({ "status": "resolved", "approved": req.approved }))
}
