//! HTTP surface: one module per route family, assembled into a single
//! Axum router in `build_router`, mirroring `skynet_gateway::app::build_router`.

pub mod agents;
pub mod approvals;
pub mod dispatch;
pub mod events;
pub mod health;
pub mod tasks;
pub mod trust;
pub mod webhooks;

use std::sync::Arc;

use axum::{
    routing::{get, patch, post},
    Router,
};

use crate::state::AppState;

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        .route("/dispatch", post(dispatch::dispatch_handler))
        .route("/route", post(dispatch::route_handler))
        .route("/events/tasks/{id}", get(events::task_events_handler))
        .route("/api/agents/running", get(agents::running_handler))
        .route("/hooks/{name}", post(webhooks::webhook_handler))
        .route("/webhooks/incoming", get(webhooks::incoming_handler))
        .route("/api/tasks", get(tasks::list_handler).post(tasks::create_handler))
        .route("/api/tasks/{id}", patch(tasks::patch_handler))
        .route("/api/tasks/{id}/move", post(tasks::move_handler))
        .route("/api/tasks/{id}/assign", post(tasks::assign_handler))
        .route("/api/tasks/{id}/comment", post(tasks::comment_handler))
        .route("/trust", get(trust::list_trust_handler))
        .route("/trust/{role}", post(trust::set_trust_handler))
        .route("/approvals/{id}", post(approvals::resolve_handler))
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}
