//! `GET /trust` / `POST /trust/{role}` — spec §6 trust level management.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::state::AppState;

pub async fn list_trust_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    let roles: Vec<Value> = state
        .roles
        .list_trust()
        .into_iter()
        .map(|(role, level)| json!({ "role": role, "trustLevel": level }))
        .collect();
    Json(json!({ "roles": roles }))
}

#[derive(Debug, Deserialize)]
pub struct SetTrustRequest {
    #[serde(rename = "trustLevel")]
    pub trust_level: u8,
}

pub async fn set_trust_handler(
    State(state): State<Arc<AppState>>,
    Path(role): Path<String>,
    Json(req): Json<SetTrustRequest>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    if state.roles.set_trust_level(&role, req.trust_level) {
        Ok(Json(json!({ "role": role, "trustLevel": req.trust_level })))
    } else {
        Err((
            StatusCode::NOT_FOUND,
            Json(json!({ "status": "error", "message": format!("unknown role '{role}'") })),
        ))
    }
}
