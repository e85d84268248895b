//! `GET /api/agents/running` — spec §6: list running tasks with elapsed time.

use std::sync::Arc;

use axum::{extract::State, Json};
use serde_json::{json, Value};

use crate::state::AppState;

pub async fn running_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    let running: Vec<Value> = state
        .dispatcher
        .running()
        .list()
        .into_iter()
        .map(|entry| {
            json!({
                "taskId": entry.task.id.as_str(),
                "prompt": entry.task.prompt,
                "role": entry.task.role,
                "source": entry.task.source.as_str(),
                "startedAt": entry.started_at.to_rfc3339(),
                "elapsedMs": entry.elapsed_ms(),
            })
        })
        .collect();

    Json(json!({ "running": running }))
}
