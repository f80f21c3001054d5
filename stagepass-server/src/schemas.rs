use axum::{
    async_trait,
    extract::{FromRequest, Request},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize};
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::serialized::CodeScope;

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct NewCodeSchema {
    pub scope: CodeScope,
    /// Room id for room scope, studio id for studio scope
    pub target_id: i32,
    /// Account issuing the code, supplied by the external auth layer
    pub created_by: i32,
    pub expires_at: DateTime<Utc>,
    /// 0 means unlimited
    #[validate(range(max = 100_000))]
    pub max_viewers: u32,
    #[validate(length(max = 64))]
    #[serde(default)]
    pub label: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AccessSchema {
    /// The 5-digit access code
    #[validate(length(equal = 5))]
    pub code: String,
    pub room_id: i32,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RoomStatusSchema {
    /// The studio owning the room
    pub studio_id: i32,
    pub is_active: bool,
}

#[derive(Debug, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
pub struct EventStreamParams {
    /// A session token from a prior admission
    pub token: String,
}

pub struct ValidatedJson<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for ValidatedJson<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Validate,
{
    type Rejection = (StatusCode, &'static str);

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let extracted_json: Json<T> = Json::from_request(req, state)
            .await
            .map_err(|_| (StatusCode::BAD_REQUEST, "JSON parse failed"))?;

        extracted_json
            .0
            .validate()
            .map_err(|_| (StatusCode::BAD_REQUEST, "Request body is invalid"))?;

        Ok(Self(extracted_json.0))
    }
}
