use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

mod data;
pub use data::*;

mod memory;
pub use memory::*;

pub type Result<T> = std::result::Result<T, DatabaseError>;

#[derive(Debug, Error)]
pub enum DatabaseError {
    /// An unknown or internal error happened with the database
    #[error(transparent)]
    Internal(Box<dyn std::error::Error + Send + Sync>),
    /// A resource already exists
    #[error("{resource} with {field} of value {value} already exists")]
    Conflict {
        /// The resource in question
        resource: &'static str,
        /// The field that is conflicting
        field: &'static str,
        /// The conflicting value
        value: String,
    },
    /// A resource in the database doesn't exist
    #[error("{resource}:{identifier} doesn't exist")]
    NotFound {
        resource: &'static str,
        identifier: &'static str,
    },
}

/// Represents a transactional store for stagepass data.
///
/// Code records are append-only apart from the revoked flag: once created
/// they are retained forever under their surrogate id, for analytics and
/// audit. Only the digit lookup moves when digits are reissued; the
/// secondary indices keep every record that was ever created for a key.
#[async_trait]
pub trait Database: Send + Sync + 'static {
    /// Persists a new access code under a fresh surrogate id and inserts it
    /// into the by-room, by-studio and by-creator indices, atomically.
    ///
    /// Fails with [DatabaseError::Conflict] if a live code with the same
    /// digits already exists. Digits of an inert code are repointed at the
    /// new record; the inert record itself stays untouched.
    async fn create_code(&self, new_code: NewAccessCode) -> Result<AccessCodeData>;
    /// Fetches a code by its surrogate id. Sessions resolve their owning
    /// code through here, never through the digits.
    async fn code_by_id(&self, id: PrimaryKey) -> Result<AccessCodeData>;
    /// Fetches the most recent holder of some digits
    async fn code_by_code(&self, code: &str) -> Result<AccessCodeData>;
    async fn codes_by_room(&self, room_id: PrimaryKey) -> Result<Vec<AccessCodeData>>;
    async fn codes_by_studio(&self, studio_id: PrimaryKey) -> Result<Vec<AccessCodeData>>;
    async fn codes_by_creator(&self, user_id: PrimaryKey) -> Result<Vec<AccessCodeData>>;
    /// Sets the revoked flag. Codes are never physically deleted.
    async fn revoke_code(&self, code: &str) -> Result<AccessCodeData>;

    async fn create_session(&self, new_session: NewSession) -> Result<SessionData>;
    async fn session_by_token(&self, token: &str) -> Result<SessionData>;
    /// Refreshes the last-seen timestamp of a session.
    async fn touch_session(&self, token: &str, at: DateTime<Utc>) -> Result<()>;
    /// Moves a session into its grace period, keeping any deadline that was
    /// already stamped. Returns the effective deadline.
    async fn set_session_grace(&self, token: &str, until: DateTime<Utc>) -> Result<DateTime<Utc>>;
    /// Marks a session as terminated. Returns the prior state of the
    /// session if this call was the one that terminated it, so the caller
    /// can account the departure exactly once.
    async fn terminate_session(&self, token: &str) -> Result<Option<SessionData>>;
    async fn list_sessions(&self) -> Result<Vec<SessionData>>;
    async fn delete_session(&self, token: &str) -> Result<()>;
}
