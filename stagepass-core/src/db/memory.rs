use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use super::{
    AccessCodeData, CodeScope, Database, DatabaseError, NewAccessCode, NewSession, PrimaryKey,
    Result, SessionData, SessionState,
};

/// An in-memory [Database], fronting for whatever transactional store a
/// deployment embeds. A single mutex makes every operation a transaction,
/// which keeps the secondary indices consistent with the primary records.
#[derive(Default)]
pub struct MemoryDatabase {
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    next_code_id: PrimaryKey,
    /// Every code ever created, keyed by surrogate id. Never pruned.
    codes: HashMap<PrimaryKey, AccessCodeData>,
    /// Digits point at their most recent holder. Uniqueness is enforced
    /// among live codes only; an inert holder is simply repointed.
    digits: HashMap<String, PrimaryKey>,
    codes_by_room: HashMap<PrimaryKey, Vec<PrimaryKey>>,
    codes_by_studio: HashMap<PrimaryKey, Vec<PrimaryKey>>,
    codes_by_creator: HashMap<PrimaryKey, Vec<PrimaryKey>>,
    sessions: HashMap<String, SessionData>,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }
}

impl State {
    fn link_code(&mut self, code: &AccessCodeData) {
        let index = match code.scope {
            CodeScope::Room => &mut self.codes_by_room,
            CodeScope::Studio => &mut self.codes_by_studio,
        };

        index.entry(code.target_id).or_default().push(code.id);

        self.codes_by_creator
            .entry(code.created_by)
            .or_default()
            .push(code.id);
    }

    fn collect_codes(
        &self,
        index: &HashMap<PrimaryKey, Vec<PrimaryKey>>,
        key: PrimaryKey,
    ) -> Vec<AccessCodeData> {
        index
            .get(&key)
            .into_iter()
            .flatten()
            .filter_map(|id| self.codes.get(id).cloned())
            .collect()
    }
}

#[async_trait]
impl Database for MemoryDatabase {
    async fn create_code(&self, new_code: NewAccessCode) -> Result<AccessCodeData> {
        let mut state = self.state.lock();
        let now = Utc::now();

        // Digits of an inert code may be reissued, live ones are unique.
        // The inert record keeps its id and stays fetchable for audit.
        if let Some(holder) = state.digits.get(&new_code.code) {
            let live = state.codes.get(holder).is_some_and(|c| c.is_live(now));

            if live {
                return Err(DatabaseError::Conflict {
                    resource: "code",
                    field: "code",
                    value: new_code.code,
                });
            }
        }

        state.next_code_id += 1;

        let data = AccessCodeData {
            id: state.next_code_id,
            code: new_code.code,
            scope: new_code.scope,
            target_id: new_code.target_id,
            created_by: new_code.created_by,
            created_at: now,
            expires_at: new_code.expires_at,
            max_viewers: new_code.max_viewers,
            revoked: false,
            label: new_code.label,
        };

        state.link_code(&data);
        state.digits.insert(data.code.clone(), data.id);
        state.codes.insert(data.id, data.clone());

        Ok(data)
    }

    async fn code_by_id(&self, id: PrimaryKey) -> Result<AccessCodeData> {
        self.state
            .lock()
            .codes
            .get(&id)
            .cloned()
            .ok_or(DatabaseError::NotFound {
                resource: "code",
                identifier: "id",
            })
    }

    async fn code_by_code(&self, code: &str) -> Result<AccessCodeData> {
        let state = self.state.lock();

        state
            .digits
            .get(code)
            .and_then(|id| state.codes.get(id))
            .cloned()
            .ok_or(DatabaseError::NotFound {
                resource: "code",
                identifier: "code",
            })
    }

    async fn codes_by_room(&self, room_id: PrimaryKey) -> Result<Vec<AccessCodeData>> {
        let state = self.state.lock();
        Ok(state.collect_codes(&state.codes_by_room, room_id))
    }

    async fn codes_by_studio(&self, studio_id: PrimaryKey) -> Result<Vec<AccessCodeData>> {
        let state = self.state.lock();
        Ok(state.collect_codes(&state.codes_by_studio, studio_id))
    }

    async fn codes_by_creator(&self, user_id: PrimaryKey) -> Result<Vec<AccessCodeData>> {
        let state = self.state.lock();
        Ok(state.collect_codes(&state.codes_by_creator, user_id))
    }

    async fn revoke_code(&self, code: &str) -> Result<AccessCodeData> {
        let mut state = self.state.lock();

        let id = state.digits.get(code).copied().ok_or(DatabaseError::NotFound {
            resource: "code",
            identifier: "code",
        })?;

        let data = state.codes.get_mut(&id).ok_or(DatabaseError::NotFound {
            resource: "code",
            identifier: "id",
        })?;

        data.revoked = true;
        Ok(data.clone())
    }

    async fn create_session(&self, new_session: NewSession) -> Result<SessionData> {
        let mut state = self.state.lock();

        if state.sessions.contains_key(&new_session.token) {
            return Err(DatabaseError::Conflict {
                resource: "session",
                field: "token",
                value: new_session.token,
            });
        }

        let data = SessionData {
            token: new_session.token,
            code_id: new_session.code_id,
            state: SessionState::Active,
            connected_at: new_session.connected_at,
            last_seen: new_session.connected_at,
            grace_until: None,
            client_ip: new_session.client_ip,
            client_agent: new_session.client_agent,
        };

        state.sessions.insert(data.token.clone(), data.clone());
        Ok(data)
    }

    async fn session_by_token(&self, token: &str) -> Result<SessionData> {
        self.state
            .lock()
            .sessions
            .get(token)
            .cloned()
            .ok_or(DatabaseError::NotFound {
                resource: "session",
                identifier: "token",
            })
    }

    async fn touch_session(&self, token: &str, at: DateTime<Utc>) -> Result<()> {
        let mut state = self.state.lock();

        let session = state
            .sessions
            .get_mut(token)
            .ok_or(DatabaseError::NotFound {
                resource: "session",
                identifier: "token",
            })?;

        session.last_seen = at;
        Ok(())
    }

    async fn set_session_grace(&self, token: &str, until: DateTime<Utc>) -> Result<DateTime<Utc>> {
        let mut state = self.state.lock();

        let session = state
            .sessions
            .get_mut(token)
            .ok_or(DatabaseError::NotFound {
                resource: "session",
                identifier: "token",
            })?;

        // Idempotent: the first stamped deadline wins
        let effective = *session.grace_until.get_or_insert(until);

        if session.state == SessionState::Active {
            session.state = SessionState::GracePeriod;
        }

        Ok(effective)
    }

    async fn terminate_session(&self, token: &str) -> Result<Option<SessionData>> {
        let mut state = self.state.lock();

        let session = state
            .sessions
            .get_mut(token)
            .ok_or(DatabaseError::NotFound {
                resource: "session",
                identifier: "token",
            })?;

        if session.state == SessionState::Terminated {
            return Ok(None);
        }

        let prior = session.clone();
        session.state = SessionState::Terminated;

        Ok(Some(prior))
    }

    async fn list_sessions(&self) -> Result<Vec<SessionData>> {
        Ok(self.state.lock().sessions.values().cloned().collect())
    }

    async fn delete_session(&self, token: &str) -> Result<()> {
        self.state.lock().sessions.remove(token);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn new_code(code: &str, scope: CodeScope, target_id: PrimaryKey) -> NewAccessCode {
        NewAccessCode {
            code: code.to_string(),
            scope,
            target_id,
            created_by: 7,
            expires_at: Utc::now() + Duration::hours(1),
            max_viewers: 0,
            label: "test".to_string(),
        }
    }

    fn new_session(token: &str, code_id: PrimaryKey) -> NewSession {
        NewSession {
            token: token.to_string(),
            code_id,
            connected_at: Utc::now(),
            client_ip: "127.0.0.1".to_string(),
            client_agent: "test".to_string(),
        }
    }

    #[tokio::test]
    async fn indices_stay_consistent_with_primary_records() {
        let db = MemoryDatabase::new();

        db.create_code(new_code("28413", CodeScope::Room, 1))
            .await
            .unwrap();
        db.create_code(new_code("91550", CodeScope::Studio, 2))
            .await
            .unwrap();

        let by_room = db.codes_by_room(1).await.unwrap();
        assert_eq!(by_room.len(), 1);
        assert!(db.code_by_code(&by_room[0].code).await.is_ok());
        assert!(db.code_by_id(by_room[0].id).await.is_ok());

        let by_studio = db.codes_by_studio(2).await.unwrap();
        assert_eq!(by_studio.len(), 1);

        let by_creator = db.codes_by_creator(7).await.unwrap();
        assert_eq!(by_creator.len(), 2);
    }

    #[tokio::test]
    async fn live_codes_conflict_on_same_digits() {
        let db = MemoryDatabase::new();

        db.create_code(new_code("28413", CodeScope::Room, 1))
            .await
            .unwrap();

        let err = db
            .create_code(new_code("28413", CodeScope::Room, 2))
            .await
            .unwrap_err();

        assert!(matches!(err, DatabaseError::Conflict { .. }));
    }

    #[tokio::test]
    async fn reissued_digits_leave_the_old_record_intact() {
        let db = MemoryDatabase::new();

        let old = db
            .create_code(new_code("28413", CodeScope::Room, 1))
            .await
            .unwrap();
        db.revoke_code("28413").await.unwrap();

        let reissued = db
            .create_code(new_code("28413", CodeScope::Room, 2))
            .await
            .unwrap();

        assert_ne!(old.id, reissued.id);

        // The digits resolve to the new holder, the old record survives
        // under its own id for audit
        assert_eq!(db.code_by_code("28413").await.unwrap().id, reissued.id);

        let retained = db.code_by_id(old.id).await.unwrap();
        assert!(retained.revoked);
        assert_eq!(retained.target_id, 1);

        // Both records stay listed under their rooms
        assert_eq!(db.codes_by_room(1).await.unwrap().len(), 1);
        assert_eq!(db.codes_by_room(2).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn grace_deadline_is_stamped_once() {
        let db = MemoryDatabase::new();
        let now = Utc::now();

        db.create_session(new_session("token", 1)).await.unwrap();

        let first = db.set_session_grace("token", now).await.unwrap();
        let second = db
            .set_session_grace("token", now + Duration::hours(1))
            .await
            .unwrap();

        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn termination_reports_the_transition_once() {
        let db = MemoryDatabase::new();

        db.create_session(new_session("token", 1)).await.unwrap();

        assert!(db.terminate_session("token").await.unwrap().is_some());
        assert!(db.terminate_session("token").await.unwrap().is_none());
    }
}
