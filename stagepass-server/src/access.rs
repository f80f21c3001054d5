use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, Path, State},
    http::{header, HeaderMap},
    routing::{delete, post},
    Json,
};
use stagepass_core::ClientInfo;

use crate::{
    context::ServerContext,
    errors::ServerResult,
    schemas::{AccessSchema, ValidatedJson},
    serialized::{AccessGrant, ToSerialized},
    Router,
};

#[utoipa::path(
    post,
    path = "/v1/access",
    tag = "access",
    request_body = AccessSchema,
    responses(
        (status = 200, body = AccessGrant),
        (status = 403, description = "Admission denied, with a structured reason")
    )
)]
async fn request_access(
    State(context): State<ServerContext>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    ValidatedJson(body): ValidatedJson<AccessSchema>,
) -> ServerResult<Json<AccessGrant>> {
    let agent = headers
        .get(header::USER_AGENT)
        .and_then(|x| x.to_str().ok())
        .unwrap_or("unknown")
        .to_string();

    let session = context
        .gateway
        .access
        .admit(
            &body.code,
            body.room_id,
            ClientInfo {
                ip: addr.ip().to_string(),
                agent,
            },
        )
        .await?;

    Ok(Json(session.to_serialized()))
}

#[utoipa::path(
    delete,
    path = "/v1/access/{token}",
    tag = "access",
    responses(
        (status = 200, description = "Session ended and its viewer slot freed")
    )
)]
async fn end_access(
    State(context): State<ServerContext>,
    Path(token): Path<String>,
) -> ServerResult<()> {
    context.gateway.access.disconnect(&token).await?;

    Ok(())
}

pub fn router() -> Router {
    Router::new()
        .route("/", post(request_access))
        .route("/:token", delete(end_access))
}
