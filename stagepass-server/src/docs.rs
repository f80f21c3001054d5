use axum::{response::IntoResponse, Json};
use utoipa::OpenApi;
use utoipauto::utoipauto;

#[utoipauto(paths = "./stagepass-server/src")]
#[derive(OpenApi)]
#[openapi(info(
    description = "stagepass-server exposes anonymous viewing access and room-status events"
))]
pub struct ApiDoc;

pub async fn docs() -> impl IntoResponse {
    Json(ApiDoc::openapi())
}
