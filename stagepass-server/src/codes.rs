use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json,
};
use stagepass_core::NewCode;

use crate::{
    context::ServerContext,
    errors::ServerResult,
    schemas::{NewCodeSchema, ValidatedJson},
    serialized::{AccessCode, CodeAnalytics, ToSerialized},
    Router,
};

#[utoipa::path(
    post,
    path = "/v1/codes",
    tag = "codes",
    request_body = NewCodeSchema,
    responses(
        (status = 200, body = AccessCode)
    )
)]
async fn create_code(
    State(context): State<ServerContext>,
    ValidatedJson(body): ValidatedJson<NewCodeSchema>,
) -> ServerResult<Json<AccessCode>> {
    let code = context
        .gateway
        .codes
        .create_code(NewCode {
            scope: body.scope.into(),
            target_id: body.target_id,
            created_by: body.created_by,
            expires_at: body.expires_at,
            max_viewers: body.max_viewers,
            label: body.label,
        })
        .await?;

    Ok(Json(code.to_serialized()))
}

#[utoipa::path(
    get,
    path = "/v1/codes/{code}",
    tag = "codes",
    responses(
        (status = 200, body = AccessCode)
    )
)]
async fn code_by_code(
    State(context): State<ServerContext>,
    Path(code): Path<String>,
) -> ServerResult<Json<AccessCode>> {
    let code = context.gateway.codes.code_by_code(&code).await?;

    Ok(Json(code.to_serialized()))
}

#[utoipa::path(
    post,
    path = "/v1/codes/{code}/revoke",
    tag = "codes",
    responses(
        (status = 200, body = AccessCode)
    )
)]
async fn revoke_code(
    State(context): State<ServerContext>,
    Path(code): Path<String>,
) -> ServerResult<Json<AccessCode>> {
    let code = context.gateway.codes.revoke(&code).await?;

    Ok(Json(code.to_serialized()))
}

#[utoipa::path(
    get,
    path = "/v1/codes/{code}/analytics",
    tag = "codes",
    responses(
        (status = 200, body = CodeAnalytics)
    )
)]
async fn code_analytics(
    State(context): State<ServerContext>,
    Path(code): Path<String>,
) -> ServerResult<Json<CodeAnalytics>> {
    let analytics = context.gateway.codes.analytics(&code).await?;

    Ok(Json(analytics.to_serialized()))
}

#[utoipa::path(
    get,
    path = "/v1/rooms/{id}/codes",
    tag = "codes",
    responses(
        (status = 200, body = Vec<AccessCode>)
    )
)]
pub async fn room_codes(
    State(context): State<ServerContext>,
    Path(room_id): Path<i32>,
) -> ServerResult<Json<Vec<AccessCode>>> {
    let codes = context.gateway.codes.list_by_room(room_id).await?;

    Ok(Json(codes.to_serialized()))
}

#[utoipa::path(
    get,
    path = "/v1/studios/{id}/codes",
    tag = "codes",
    responses(
        (status = 200, body = Vec<AccessCode>)
    )
)]
pub async fn studio_codes(
    State(context): State<ServerContext>,
    Path(studio_id): Path<i32>,
) -> ServerResult<Json<Vec<AccessCode>>> {
    let codes = context.gateway.codes.list_by_studio(studio_id).await?;

    Ok(Json(codes.to_serialized()))
}

#[utoipa::path(
    get,
    path = "/v1/creators/{id}/codes",
    tag = "codes",
    responses(
        (status = 200, body = Vec<AccessCode>)
    )
)]
pub async fn creator_codes(
    State(context): State<ServerContext>,
    Path(user_id): Path<i32>,
) -> ServerResult<Json<Vec<AccessCode>>> {
    let codes = context.gateway.codes.list_by_creator(user_id).await?;

    Ok(Json(codes.to_serialized()))
}

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_code))
        .route("/:code", get(code_by_code))
        .route("/:code/revoke", post(revoke_code))
        .route("/:code/analytics", get(code_analytics))
}
