use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The type used for primary keys of external resources (rooms, studios,
/// accounts). Those records live in their own services; stagepass only
/// stores their ids.
pub type PrimaryKey = i32;

/// What a code grants access to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CodeScope {
    /// A single room
    Room,
    /// Every room belonging to a studio
    Studio,
}

/// A 5-digit access code granting time-boxed anonymous viewing
#[derive(Debug, Clone)]
pub struct AccessCodeData {
    /// Surrogate key. Stable forever, even after the digits are reissued
    /// to a newer code.
    pub id: PrimaryKey,
    /// The digits themselves, unique among live codes
    pub code: String,
    pub scope: CodeScope,
    /// The room or studio this code opens, depending on scope
    pub target_id: PrimaryKey,
    /// The account that issued the code
    pub created_by: PrimaryKey,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// Maximum concurrent viewers. 0 means unlimited.
    pub max_viewers: u32,
    pub revoked: bool,
    /// A human label like "Premiere night"
    pub label: String,
}

impl AccessCodeData {
    /// Whether the code can still admit new sessions at `now`. Grace
    /// periods apply to existing sessions only, never to admission.
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        !self.revoked && now < self.expires_at
    }
}

#[derive(Debug)]
pub struct NewAccessCode {
    pub code: String,
    pub scope: CodeScope,
    pub target_id: PrimaryKey,
    pub created_by: PrimaryKey,
    pub expires_at: DateTime<Utc>,
    pub max_viewers: u32,
    pub label: String,
}

/// Lifecycle of a viewer session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// The owning code is still valid
    Active,
    /// The owning code hard-expired while this session was live
    GracePeriod,
    /// Absorbing. The token is rejected from here on.
    Terminated,
}

/// One viewer's live binding to a code
#[derive(Debug, Clone)]
pub struct SessionData {
    /// The opaque session token
    pub token: String,
    /// Surrogate id of the owning code. Sessions stay bound to the exact
    /// code they were admitted under, even when its digits are later
    /// reissued to a different code.
    pub code_id: PrimaryKey,
    pub state: SessionState,
    pub connected_at: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    /// Set the moment the owning code is first observed expired.
    /// Monotonically non-decreasing once set.
    pub grace_until: Option<DateTime<Utc>>,
    pub client_ip: String,
    pub client_agent: String,
}

#[derive(Debug)]
pub struct NewSession {
    pub token: String,
    pub code_id: PrimaryKey,
    pub connected_at: DateTime<Utc>,
    pub client_ip: String,
    pub client_agent: String,
}
