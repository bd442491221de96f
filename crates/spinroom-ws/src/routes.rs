use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;
use serde_json::{json, Value};
use spinroom_core::AppState;
use tracing::info;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSummary {
    room_id: String,
    room_code: String,
    member_count: usize,
}

/// POST /api/rooms: mint an empty room. The creator joins over the
/// gateway like everyone else and becomes host as the first member.
pub async fn create_room(State(state): State<AppState>) -> (StatusCode, Json<RoomSummary>) {
    let handle = state.create_room();
    let room = handle.room.lock().await;
    info!(room_id = %room.state.room_id, code = %room.state.room_code, "room created");
    (
        StatusCode::CREATED,
        Json(RoomSummary {
            room_id: room.state.room_id.clone(),
            room_code: room.state.room_code.clone(),
            member_count: 0,
        }),
    )
}

/// GET /api/rooms/{code}: resolve a join code to a room id.
pub async fn resolve_room(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Json<RoomSummary>, (StatusCode, Json<Value>)> {
    let not_found = || {
        (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "room not found" })),
        )
    };
    let room_id = state.rooms.resolve_code(&code).ok_or_else(not_found)?;
    let handle = state.rooms.get(&room_id).ok_or_else(not_found)?;
    let room = handle.room.lock().await;
    Ok(Json(RoomSummary {
        room_id: room.state.room_id.clone(),
        room_code: room.state.room_code.clone(),
        member_count: room.state.members.len(),
    }))
}
