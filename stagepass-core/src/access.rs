use chrono::{DateTime, Utc};
use log::{info, warn};
use thiserror::Error;

use crate::{
    codes::CODE_PATTERN, util::random_string, AccessCodeData, CodeScope, Database, DatabaseError,
    DirectoryError, GatewayContext, NewSession, PrimaryKey, RoomDirectory, SessionData,
    SessionState,
};

/// Tracks viewer sessions and decides, per access check, whether viewing
/// is currently allowed.
pub struct AccessTracker<Db, Dir> {
    context: GatewayContext<Db, Dir>,
}

/// Everything that can deny a viewer. Each variant is a structured reason
/// the caller can render; none of them are fatal to anything but the one
/// session or code involved.
#[derive(Debug, Error)]
pub enum AccessError {
    #[error("Session does not exist")]
    SessionNotFound,
    /// The token was terminated and will never be admitted again
    #[error("Session has expired")]
    SessionExpired,
    #[error("Code does not exist")]
    CodeNotFound,
    #[error("Code has been revoked")]
    CodeRevoked,
    /// Expired codes admit no new sessions, grace or not
    #[error("Code has expired")]
    CodeExpired,
    #[error("Grace period has elapsed")]
    GraceExpired,
    #[error("Code does not grant access to this room")]
    ScopeMismatch,
    #[error("Viewer limit for this code is reached")]
    ViewerLimitReached,
    #[error(transparent)]
    Directory(#[from] DirectoryError),
    #[error(transparent)]
    Db(DatabaseError),
}

impl AccessError {
    /// Stable machine-readable reason
    pub fn reason(&self) -> &'static str {
        match self {
            Self::SessionNotFound => "session-not-found",
            Self::SessionExpired => "session-expired",
            Self::CodeNotFound => "code-not-found",
            Self::CodeRevoked => "code-revoked",
            Self::CodeExpired => "code-expired",
            Self::GraceExpired => "grace-expired",
            Self::ScopeMismatch => "scope-mismatch",
            Self::ViewerLimitReached => "viewer-limit-reached",
            Self::Directory(_) => "room-not-found",
            Self::Db(_) => "internal",
        }
    }
}

/// Transport-level details of the viewer, recorded on the session
#[derive(Debug, Clone)]
pub struct ClientInfo {
    pub ip: String,
    pub agent: String,
}

impl<Db, Dir> AccessTracker<Db, Dir>
where
    Db: Database,
    Dir: RoomDirectory,
{
    const TOKEN_LENGTH: usize = 32;

    pub fn new(context: &GatewayContext<Db, Dir>) -> Self {
        Self {
            context: context.clone(),
        }
    }

    /// Admits a viewer presenting a code, creating a fresh session.
    pub async fn admit(
        &self,
        code: &str,
        room_id: PrimaryKey,
        client: ClientInfo,
    ) -> Result<SessionData, AccessError> {
        self.admit_at(Utc::now(), code, room_id, client).await
    }

    pub async fn admit_at(
        &self,
        now: DateTime<Utc>,
        code: &str,
        room_id: PrimaryKey,
        client: ClientInfo,
    ) -> Result<SessionData, AccessError> {
        if !CODE_PATTERN.is_match(code) {
            return Err(AccessError::CodeNotFound);
        }

        let code_data = self
            .context
            .database
            .code_by_code(code)
            .await
            .map_err(code_error)?;

        if code_data.revoked {
            return Err(AccessError::CodeRevoked);
        }

        if now >= code_data.expires_at {
            return Err(AccessError::CodeExpired);
        }

        self.check_scope(&code_data, room_id).await?;

        // One critical section per code, so concurrent admissions cannot
        // overshoot the cap
        if !self
            .context
            .analytics
            .try_connect(code_data.id, code_data.max_viewers, now)
        {
            return Err(AccessError::ViewerLimitReached);
        }

        let new_session = NewSession {
            token: random_string(Self::TOKEN_LENGTH),
            code_id: code_data.id,
            connected_at: now,
            client_ip: client.ip,
            client_agent: client.agent,
        };

        match self.context.database.create_session(new_session).await {
            Ok(session) => {
                self.context.analytics.record_admission(code_data.id, now);

                info!(
                    "Viewer {} admitted to room {} with code {}",
                    session.client_ip, room_id, code_data.code
                );

                Ok(session)
            }
            Err(e) => {
                // The viewer never existed as far as the counters care
                self.context.analytics.on_disconnect(code_data.id);
                Err(AccessError::Db(e))
            }
        }
    }

    /// Re-validates an existing session for a room. Refreshes last-seen on
    /// success, and drives the session state machine on every call.
    pub async fn check_access(
        &self,
        token: &str,
        room_id: PrimaryKey,
    ) -> Result<(), AccessError> {
        self.check_access_at(Utc::now(), token, room_id).await
    }

    pub async fn check_access_at(
        &self,
        now: DateTime<Utc>,
        token: &str,
        room_id: PrimaryKey,
    ) -> Result<(), AccessError> {
        let session = self
            .context
            .database
            .session_by_token(token)
            .await
            .map_err(session_error)?;

        if session.state == SessionState::Terminated {
            return Err(AccessError::SessionExpired);
        }

        // Resolved by id: the session stays bound to the code it was
        // admitted under even after those digits are reissued
        let code = self
            .context
            .database
            .code_by_id(session.code_id)
            .await
            .map_err(code_error)?;

        if code.revoked {
            self.terminate(&session).await;
            return Err(AccessError::CodeRevoked);
        }

        if now >= code.expires_at {
            // The window runs from the code's hard deadline, regardless of
            // when the expiry was first observed
            let until = self
                .context
                .database
                .set_session_grace(token, code.expires_at + self.context.config.grace_period)
                .await
                .map_err(session_error)?;

            if now >= until {
                self.terminate(&session).await;
                return Err(AccessError::GraceExpired);
            }
        }

        self.check_scope(&code, room_id).await?;

        self.context
            .database
            .touch_session(token, now)
            .await
            .map_err(session_error)?;

        Ok(())
    }

    /// Ends a session deliberately, freeing its viewer slot.
    pub async fn disconnect(&self, token: &str) -> Result<(), AccessError> {
        let prior = self
            .context
            .database
            .terminate_session(token)
            .await
            .map_err(session_error)?;

        if let Some(session) = prior {
            self.context.analytics.on_disconnect(session.code_id);
            info!(
                "Viewer {} disconnected from code {}",
                session.client_ip, session.code_id
            );
        }

        Ok(())
    }

    /// Reaps sessions past their grace deadline or idle past the timeout,
    /// and forgets terminated ones after the same timeout.
    pub async fn sweep(&self) {
        self.sweep_at(Utc::now()).await
    }

    pub async fn sweep_at(&self, now: DateTime<Utc>) {
        let sessions = match self.context.database.list_sessions().await {
            Ok(sessions) => sessions,
            Err(e) => {
                warn!("Session sweep could not list sessions: {e}");
                return;
            }
        };

        for session in sessions {
            let idle = now - session.last_seen >= self.context.config.session_timeout;

            if session.state == SessionState::Terminated {
                if idle {
                    let _ = self.context.database.delete_session(&session.token).await;
                }

                continue;
            }

            let grace_elapsed = session.grace_until.map(|g| now >= g).unwrap_or(false);

            if idle || grace_elapsed {
                self.terminate(&session).await;
            }
        }
    }

    async fn check_scope(
        &self,
        code: &AccessCodeData,
        room_id: PrimaryKey,
    ) -> Result<(), AccessError> {
        match code.scope {
            CodeScope::Room => {
                if code.target_id == room_id {
                    Ok(())
                } else {
                    Err(AccessError::ScopeMismatch)
                }
            }
            CodeScope::Studio => {
                let room = self.context.directory.room(room_id).await?;

                if room.studio_id == code.target_id {
                    Ok(())
                } else {
                    Err(AccessError::ScopeMismatch)
                }
            }
        }
    }

    /// Terminates and accounts the departure exactly once, tolerating the
    /// races between revocation, grace expiry, sweep and disconnect.
    async fn terminate(&self, session: &SessionData) {
        match self.context.database.terminate_session(&session.token).await {
            Ok(Some(_)) => self.context.analytics.on_disconnect(session.code_id),
            Ok(None) => {}
            Err(e) => warn!("Could not terminate session: {e}"),
        }
    }
}

fn session_error(e: DatabaseError) -> AccessError {
    match e {
        DatabaseError::NotFound { .. } => AccessError::SessionNotFound,
        e => AccessError::Db(e),
    }
}

fn code_error(e: DatabaseError) -> AccessError {
    match e {
        DatabaseError::NotFound { .. } => AccessError::CodeNotFound,
        e => AccessError::Db(e),
    }
}
