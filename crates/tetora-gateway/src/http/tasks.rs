//! `/api/tasks*` — spec §6 task board family, backed by `crate::board::TaskBoard`.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::board::BoardCard;
use crate::state::AppState;

fn not_found(id: &str) -> (StatusCode, Json<Value>) {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "status": "error", "message": format!("unknown task board card '{id}'") })),
    )
}

pub async fn list_handler(State(state): State<Arc<AppState>>) -> Json<Vec<BoardCard>> {
    Json(state.board.list())
}

#[derive(Debug, Deserialize)]
pub struct CreateCardRequest {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub status: Option<String>,
}

pub async fn create_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateCardRequest>,
) -> Json<BoardCard> {
    Json(state.board.create(req.title, req.description, req.status))
}

#[derive(Debug, Deserialize)]
pub struct PatchCardRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<String>,
}

pub async fn patch_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<PatchCardRequest>,
) -> Result<Json<BoardCard>, (StatusCode, Json<Value>)> {
    state
        .board
        .patch(&id, req.title, req.description, req.status)
        .map(Json)
        .ok_or_else(|| not_found(&id))
}

#[derive(Debug, Deserialize)]
pub struct MoveCardRequest {
    pub status: String,
}

pub async fn move_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<MoveCardRequest>,
) -> Result<Json<BoardCard>, (StatusCode, Json<Value>)> {
    state.board.mv(&id, req.status).map(Json).ok_or_else(|| not_found(&id))
}

#[derive(Debug, Deserialize)]
pub struct AssignCardRequest {
    pub assignee: String,
}

pub async fn assign_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<AssignCardRequest>,
) -> Result<Json<BoardCard>, (StatusCode, Json<Value>)> {
    state.board.assign(&id, req.assignee).map(Json).ok_or_else(|| not_found(&id))
}

#[derive(Debug, Deserialize)]
pub struct CommentCardRequest {
    pub body: String,
}

pub async fn comment_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<CommentCardRequest>,
) -> Result<Json<BoardCard>, (StatusCode, Json<Value>)> {
    state.board.comment(&id, req.body).map(Json).ok_or_else(|| not_found(&id))
}
