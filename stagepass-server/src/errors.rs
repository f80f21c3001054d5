use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use stagepass_core::{AccessError, CodeError, DatabaseError, DirectoryError};
use thiserror::Error;
use utoipa::ToSchema;

pub type ServerResult<T> = Result<T, ServerError>;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("{resource}:{identifier} not found")]
    NotFound {
        resource: &'static str,
        identifier: &'static str,
    },
    #[error("{resource} with {field} of value {value} already exists")]
    Conflict {
        resource: &'static str,
        field: &'static str,
        value: String,
    },
    #[error("Expiration must be in the future")]
    InvalidExpiration,
    #[error("Could not generate a code, try again later")]
    GenerationExhausted,
    /// An access denial with a structured reason
    #[error(transparent)]
    Denied(AccessError),
    #[error("Unknown internal error: {0}")]
    Unknown(String),
}

/// Wire form of an access denial, so clients can render a specific message
#[derive(Debug, Serialize, ToSchema)]
pub struct Denial {
    /// Machine-readable reason, e.g. `viewer-limit-reached`
    pub reason: &'static str,
    pub message: String,
}

impl ServerError {
    fn as_status_code(&self) -> StatusCode {
        match self {
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::Conflict { .. } => StatusCode::CONFLICT,
            Self::InvalidExpiration => StatusCode::BAD_REQUEST,
            Self::GenerationExhausted => StatusCode::SERVICE_UNAVAILABLE,
            Self::Denied(reason) => match reason {
                AccessError::SessionNotFound | AccessError::SessionExpired => {
                    StatusCode::UNAUTHORIZED
                }
                AccessError::CodeNotFound | AccessError::Directory(_) => StatusCode::NOT_FOUND,
                _ => StatusCode::FORBIDDEN,
            },
            Self::Unknown(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.as_status_code();

        match self {
            Self::Denied(reason) => (
                status,
                Json(Denial {
                    reason: reason.reason(),
                    message: reason.to_string(),
                }),
            )
                .into_response(),
            other => (status, other.to_string()).into_response(),
        }
    }
}

impl From<AccessError> for ServerError {
    fn from(value: AccessError) -> Self {
        match value {
            AccessError::Db(e) => Self::Unknown(e.to_string()),
            e => Self::Denied(e),
        }
    }
}

impl From<CodeError> for ServerError {
    fn from(value: CodeError) -> Self {
        match value {
            CodeError::GenerationExhausted(_) => Self::GenerationExhausted,
            CodeError::InvalidExpiration => Self::InvalidExpiration,
            CodeError::Db(e) => e.into(),
        }
    }
}

impl From<DatabaseError> for ServerError {
    fn from(value: DatabaseError) -> Self {
        match value {
            DatabaseError::NotFound {
                resource,
                identifier,
            } => Self::NotFound {
                resource,
                identifier,
            },
            DatabaseError::Conflict {
                resource,
                field,
                value,
            } => Self::Conflict {
                resource,
                field,
                value,
            },
            e => Self::Unknown(e.to_string()),
        }
    }
}

impl From<DirectoryError> for ServerError {
    fn from(value: DirectoryError) -> Self {
        match value {
            DirectoryError::RoomNotFound(_) => Self::NotFound {
                resource: "room",
                identifier: "id",
            },
        }
    }
}
