use axum::{
    extract::{Path, State},
    routing::{get, put},
    Json,
};
use stagepass_core::{DirectoryError, RoomInfo};

use crate::{
    codes,
    context::ServerContext,
    errors::ServerResult,
    schemas::{RoomStatusSchema, ValidatedJson},
    serialized::{RoomStatus, ToSerialized},
    sse, Router,
};

/// Directory sync: the external room service pushes a room's current state
/// here, and every viewer of the room hears about it.
#[utoipa::path(
    put,
    path = "/v1/rooms/{id}/status",
    tag = "rooms",
    request_body = RoomStatusSchema,
    responses(
        (status = 200, body = RoomStatus)
    )
)]
async fn update_status(
    State(context): State<ServerContext>,
    Path(room_id): Path<i32>,
    ValidatedJson(body): ValidatedJson<RoomStatusSchema>,
) -> ServerResult<Json<RoomStatus>> {
    let room = match context.directory.set_active(room_id, body.is_active) {
        Ok(room) => room,
        Err(DirectoryError::RoomNotFound(_)) => {
            let room = RoomInfo {
                id: room_id,
                studio_id: body.studio_id,
                is_active: body.is_active,
            };

            context.directory.insert(room.clone());
            room
        }
    };

    context.gateway.publish_room_status(room_id, room.is_active);

    Ok(Json(room.to_serialized()))
}

#[utoipa::path(
    get,
    path = "/v1/rooms/{id}/status",
    tag = "rooms",
    responses(
        (status = 200, body = RoomStatus)
    )
)]
async fn room_status(
    State(context): State<ServerContext>,
    Path(room_id): Path<i32>,
) -> ServerResult<Json<RoomStatus>> {
    let room = context.gateway.room(room_id).await?;

    Ok(Json(room.to_serialized()))
}

pub fn router() -> Router {
    Router::new()
        .route("/:id/status", get(room_status))
        .route("/:id/status", put(update_status))
        .route("/:id/codes", get(codes::room_codes))
        .route("/:id/events", get(sse::room_events))
}
