//! `POST /dispatch` and `POST /route` — spec §6. Both accept the same
//! request body; `/route` additionally resolves `role` through the C3
//! router instead of trusting the caller, using an ad-hoc `RouteOrigin`
//! built from `source`.

use std::sync::Arc;
use std::time::Duration;

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tetora_core::types::{Task, TaskResult};
use tetora_router::RouteOrigin;

use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct DispatchRequest {
    pub prompt: String,
    pub role: Option<String>,
    #[serde(default = "default_source")]
    pub source: String,
    pub model: Option<String>,
    pub budget: Option<f64>,
    pub timeout_ms: Option<u64>,
    pub session_id: Option<String>,
    /// When true, submit fire-and-forget and return `{taskId}` immediately
    /// instead of awaiting the full `TaskResult` (spec §6: "sync (default)
    /// or async").
    #[serde(default)]
    pub r#async: bool,
}

fn default_source() -> String {
    "dispatch".to_string()
}

impl DispatchRequest {
    fn into_task(self) -> Task {
        let mut task = Task::new(self.prompt, self.source.as_str());
        task.role = self.role;
        task.model = self.model;
        task.budget = self.budget.unwrap_or(0.0);
        if let Some(ms) = self.timeout_ms {
            task.timeout = Duration::from_millis(ms);
        }
        task.session_id = self.session_id.map(|s| s.as_str().into());
        task
    }
}

/// Wire shape for a completed task, per spec §8 scenario A
/// (`{status:"success", output:"hello", costUSD:0}`) — a dedicated DTO
/// rather than deriving straight off `TaskResult`, since the rest of the
/// codebase's types are plain snake_case and this one boundary needs the
/// spec's literal camelCase field names.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TaskResultDto {
    status: String,
    output: String,
    error: String,
    #[serde(rename = "costUSD")]
    cost_usd: f64,
    tokens_in: u32,
    tokens_out: u32,
    model: String,
    duration_ms: u64,
    output_file: Option<String>,
}

impl From<TaskResult> for TaskResultDto {
    fn from(r: TaskResult) -> Self {
        Self {
            status: r.status.to_string(),
            output: r.output,
            error: r.error,
            cost_usd: r.cost_usd,
            tokens_in: r.tokens_in,
            tokens_out: r.tokens_out,
            model: r.model,
            duration_ms: r.duration_ms,
            output_file: r.output_file,
        }
    }
}

/// POST /dispatch — body `{prompt, role?, source?, ...}` -> `TaskResult`
/// (sync) or `{taskId}` (async).
pub async fn dispatch_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<DispatchRequest>,
) -> Json<Value> {
    let is_async = req.r#async;
    let task = req.into_task();

    if is_async {
        let task_id = state.sink.dispatch_async(task);
        return Json(json!({ "taskId": task_id.as_str() }));
    }

    let result: TaskResultDto = state.sink.dispatch_sync(task).await.into();
    Json(serde_json::to_value(result).unwrap_or_else(|_| json!({})))
}

/// POST /route — same body shape, but resolves the role via the router
/// before dispatch rather than trusting a caller-supplied `role`.
pub async fn route_handler(
    State(state): State<Arc<AppState>>,
    Json(mut req): Json<DispatchRequest>,
) -> Json<Value> {
    let is_async = req.r#async;
    let origin = RouteOrigin::new(req.source.clone());
    let route = state.router.route(&req.prompt, &origin).await;
    req.role = Some(route.role);

    let task = req.into_task();

    if is_async {
        let task_id = state.sink.dispatch_async(task);
        return Json(json!({ "taskId": task_id.as_str() }));
    }

    let result: TaskResultDto = state.sink.dispatch_sync(task).await.into();
    Json(serde_json::to_value(result).unwrap_or_else(|_| json!({})))
}
