//! All schemas that are exposed from endpoints are defined here
//! along with the conversions from core types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use stagepass_core::{
    AccessCodeData, CodeAnalytics as CoreCodeAnalytics, CodeScope as CoreCodeScope, RoomInfo,
    SessionData,
};
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum CodeScope {
    Room,
    Studio,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AccessCode {
    id: i32,
    code: String,
    scope: CodeScope,
    target_id: i32,
    created_by: i32,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    max_viewers: u32,
    revoked: bool,
    label: String,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CodeAnalytics {
    total_connections: u64,
    current_viewers: u32,
    peak_viewers: u32,
    peak_at: Option<DateTime<Utc>>,
    last_connection_at: Option<DateTime<Utc>>,
}

/// What a viewer gets back on admission
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AccessGrant {
    token: String,
    code_id: i32,
    connected_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RoomStatus {
    id: i32,
    studio_id: i32,
    is_active: bool,
}

/// Helper trait to convert any type into a serialized version
pub trait ToSerialized<T>
where
    T: Serialize,
{
    fn to_serialized(&self) -> T;
}

impl<I, O> ToSerialized<Vec<O>> for Vec<I>
where
    I: ToSerialized<O>,
    O: Serialize,
{
    fn to_serialized(&self) -> Vec<O> {
        self.iter().map(|x| x.to_serialized()).collect()
    }
}

impl From<CodeScope> for CoreCodeScope {
    fn from(value: CodeScope) -> Self {
        match value {
            CodeScope::Room => Self::Room,
            CodeScope::Studio => Self::Studio,
        }
    }
}

impl From<CoreCodeScope> for CodeScope {
    fn from(value: CoreCodeScope) -> Self {
        match value {
            CoreCodeScope::Room => Self::Room,
            CoreCodeScope::Studio => Self::Studio,
        }
    }
}

impl ToSerialized<AccessCode> for AccessCodeData {
    fn to_serialized(&self) -> AccessCode {
        AccessCode {
            id: self.id,
            code: self.code.clone(),
            scope: self.scope.into(),
            target_id: self.target_id,
            created_by: self.created_by,
            created_at: self.created_at,
            expires_at: self.expires_at,
            max_viewers: self.max_viewers,
            revoked: self.revoked,
            label: self.label.clone(),
        }
    }
}

impl ToSerialized<CodeAnalytics> for CoreCodeAnalytics {
    fn to_serialized(&self) -> CodeAnalytics {
        CodeAnalytics {
            total_connections: self.total_connections,
            current_viewers: self.current_viewers,
            peak_viewers: self.peak_viewers,
            peak_at: self.peak_at,
            last_connection_at: self.last_connection_at,
        }
    }
}

impl ToSerialized<AccessGrant> for SessionData {
    fn to_serialized(&self) -> AccessGrant {
        AccessGrant {
            token: self.token.clone(),
            code_id: self.code_id,
            connected_at: self.connected_at,
        }
    }
}

impl ToSerialized<RoomStatus> for RoomInfo {
    fn to_serialized(&self) -> RoomStatus {
        RoomStatus {
            id: self.id,
            studio_id: self.studio_id,
            is_active: self.is_active,
        }
    }
}
