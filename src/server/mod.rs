//! Read-only JSON surface: session status and the slot inventory, plus a
//! cancel control for the running session. This is what the gadget's web UI
//! polls; it never touches session state directly, only snapshots.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use parking_lot::{Mutex, RwLock};
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};

use crate::link::CancelHandle;
use crate::storage::SlotStore;
use crate::types::StatusSnapshot;

#[derive(Clone)]
pub struct ApiState {
    pub status: Arc<RwLock<StatusSnapshot>>,
    pub store: Arc<Mutex<SlotStore>>,
    pub cancel: CancelHandle,
}

pub fn build_router(state: ApiState) -> Router {
    let cors = CorsLayer::new().allow_origin(Any);

    Router::new()
        .route("/api/status", get(get_status))
        .route("/api/pokemon", get(list_pokemon))
        .route("/api/pokemon/{slot}", get(get_pokemon).delete(delete_pokemon))
        .route("/api/trade/cancel", post(post_cancel))
        .layer(cors)
        .with_state(state)
}

async fn get_status(State(state): State<ApiState>) -> Json<StatusSnapshot> {
    Json(state.status.read().clone())
}

async fn list_pokemon(State(state): State<ApiState>) -> Response {
    match state.store.lock().list() {
        Ok(entries) => Json(json!({ "pokemon": entries })).into_response(),
        Err(e) => storage_error(e),
    }
}

async fn get_pokemon(State(state): State<ApiState>, Path(slot): Path<u8>) -> Response {
    let info = match state.store.lock().slot_info(slot) {
        Ok(info) => info,
        Err(e) => return storage_error(e),
    };
    match info {
        Some((summary, stored_at)) => Json(json!({
            "slot": slot,
            "occupied": true,
            "summary": summary,
            "stored_at": stored_at,
        }))
        .into_response(),
        None => Json(json!({ "slot": slot, "occupied": false })).into_response(),
    }
}

async fn delete_pokemon(State(state): State<ApiState>, Path(slot): Path<u8>) -> Response {
    match state.store.lock().delete(slot) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => storage_error(e),
    }
}

async fn post_cancel(State(state): State<ApiState>) -> StatusCode {
    state.cancel.request();
    StatusCode::ACCEPTED
}

fn storage_error(e: crate::error::StorageError) -> Response {
    use crate::error::StorageError;
    let code = match e {
        StorageError::InvalidSlot(_) => StatusCode::NOT_FOUND,
        StorageError::EmptySlot(_) => StatusCode::NOT_FOUND,
        StorageError::Corrupt { .. } => StatusCode::CONFLICT,
        StorageError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (code, Json(json!({ "error": e.to_string() }))).into_response()
}
