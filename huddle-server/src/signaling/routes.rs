use crate::{SignalingService, ws_handler};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use huddle_core::{PeerId, RoomId};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};

#[derive(Debug, Serialize)]
pub struct RoomView {
    pub room: RoomId,
    pub peers: Vec<PeerId>,
}

/// `/ws` signaling channel, `/health`, and `/rooms/{room}` membership.
pub fn router(service: SignalingService) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health))
        .route("/rooms/{room}", get(room_view))
        .layer(cors)
        .with_state(service)
}

async fn health() -> &'static str {
    "ok"
}

async fn room_view(
    Path(room): Path<String>,
    State(service): State<SignalingService>,
) -> impl IntoResponse {
    let room = RoomId::from(room);
    match service.snapshot(&room).await {
        Ok(peers) => Json(RoomView { room, peers }).into_response(),
        Err(e) => (StatusCode::SERVICE_UNAVAILABLE, e.to_string()).into_response(),
    }
}
