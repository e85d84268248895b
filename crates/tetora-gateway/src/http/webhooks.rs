//! `POST /hooks/{name}` and `GET /webhooks/incoming` — spec §4.7 / §6.
//!
//! Same auth-then-forward shape as `skynet_gateway::http::webhooks`, but
//! the pipeline itself (signature check, filter, template expansion) lives
//! in `tetora_webhooks::handle_webhook`; this handler's job is purely the
//! HTTP-layer glue: pull headers/body off the request, map
//! `WebhookOutcome`/`WebhookError` onto the exact response shapes spec §8
//! scenarios B-D require.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{ConnectInfo, Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use serde_json::{json, Value};
use tetora_webhooks::{handle_webhook, SignatureHeaders, TracingAuditSink, WebhookError, WebhookOutcome};
use tracing::warn;

use crate::state::AppState;

fn header_str(headers: &HeaderMap, name: &str) -> Option<String> {
    headers.get(name).and_then(|v| v.to_str().ok()).map(str::to_string)
}

fn signature_headers(headers: &HeaderMap) -> SignatureHeaders {
    SignatureHeaders {
        hub_signature_256: header_str(headers, "x-hub-signature-256"),
        gitlab_token: header_str(headers, "x-gitlab-token"),
        webhook_signature: header_str(headers, "x-webhook-signature"),
    }
}

/// POST /hooks/{name}
pub async fn webhook_handler(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let source = state
        .config
        .webhooks
        .sources
        .iter()
        .find(|s| s.name == name)
        .cloned()
        .ok_or_else(|| {
            warn!(source = %name, "unknown webhook source");
            (
                StatusCode::NOT_FOUND,
                Json(json!({ "status": "error", "message": "unknown webhook source" })),
            )
        })?;

    let client_ip = addr.ip().to_string();
    let sig_headers = signature_headers(&headers);
    let audit = TracingAuditSink;

    let outcome = handle_webhook(&source, &sig_headers, &body, &client_ip, state.sink.as_ref(), &audit)
        .await
        .map_err(webhook_error_response)?;

    Ok(Json(match outcome {
        WebhookOutcome::Accepted { task_id } => json!({ "status": "accepted", "taskId": task_id.as_str() }),
        WebhookOutcome::Filtered => json!({ "status": "filtered" }),
        WebhookOutcome::AuthError { message } => json!({ "status": "error", "message": message }),
    }))
}

fn webhook_error_response(err: WebhookError) -> (StatusCode, Json<Value>) {
    let status = StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(json!({ "status": "error", "message": err.to_string() })))
}

/// GET /webhooks/incoming — list configured sources (secrets never echoed back).
pub async fn incoming_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    let sources: Vec<Value> = state
        .config
        .webhooks
        .sources
        .iter()
        .map(|s| {
            json!({
                "name": s.name,
                "targetRole": s.target_role,
                "enabled": s.enabled,
                "hasSecret": s.secret.is_some(),
            })
        })
        .collect();

    Json(json!({ "enabled": state.config.webhooks.enabled, "sources": sources }))
}
