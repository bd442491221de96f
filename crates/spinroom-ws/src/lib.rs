mod handler;
mod routes;
mod session;

use axum::routing::{get, post};
use axum::Router;
use spinroom_core::AppState;

pub fn gateway_router() -> Router<AppState> {
    Router::new()
        .route("/gateway", get(handler::ws_upgrade))
        .route("/api/rooms", post(routes::create_room))
        .route("/api/rooms/{code}", get(routes::resolve_room))
}
