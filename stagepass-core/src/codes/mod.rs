mod generator;

use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use log::info;
use regex::Regex;
use thiserror::Error;

pub use generator::*;

use crate::{
    AccessCodeData, CodeAnalytics, CodeScope, Database, DatabaseError, GatewayContext, NewAccessCode,
    PrimaryKey, RoomDirectory,
};

lazy_static! {
    /// The only shape a code ever takes
    pub static ref CODE_PATTERN: Regex = Regex::new(r"^[0-9]{5}$").expect("pattern compiles");
}

/// Issues and manages access codes
pub struct CodeManager<Db, Dir> {
    context: GatewayContext<Db, Dir>,
}

#[derive(Debug, Error)]
pub enum CodeError {
    /// Every attempt hit a weak pattern or a collision. Retryable.
    #[error("Could not produce a code within {0} attempts")]
    GenerationExhausted(usize),
    #[error("Expiration must be in the future")]
    InvalidExpiration,
    #[error(transparent)]
    Db(DatabaseError),
}

/// What a caller supplies to issue a code. The digits themselves are
/// always generated, never chosen.
#[derive(Debug)]
pub struct NewCode {
    pub scope: CodeScope,
    pub target_id: PrimaryKey,
    pub created_by: PrimaryKey,
    pub expires_at: DateTime<Utc>,
    pub max_viewers: u32,
    pub label: String,
}

impl<Db, Dir> CodeManager<Db, Dir>
where
    Db: Database,
    Dir: RoomDirectory,
{
    pub fn new(context: &GatewayContext<Db, Dir>) -> Self {
        Self {
            context: context.clone(),
        }
    }

    /// Generates and persists a new code. Collisions with live codes are
    /// retried, within the same bound as weak patterns.
    pub async fn create_code(&self, new_code: NewCode) -> Result<AccessCodeData, CodeError> {
        if new_code.expires_at <= Utc::now() {
            return Err(CodeError::InvalidExpiration);
        }

        let attempts = self.context.config.generation_attempts;

        for _ in 0..attempts {
            let code = generate_code(attempts)?;

            let result = self
                .context
                .database
                .create_code(NewAccessCode {
                    code,
                    scope: new_code.scope,
                    target_id: new_code.target_id,
                    created_by: new_code.created_by,
                    expires_at: new_code.expires_at,
                    max_viewers: new_code.max_viewers,
                    label: new_code.label.clone(),
                })
                .await;

            match result {
                Ok(data) => {
                    info!(
                        "Issued {:?} code {} for target {}",
                        data.scope, data.code, data.target_id
                    );

                    return Ok(data);
                }
                Err(DatabaseError::Conflict { .. }) => continue,
                Err(e) => return Err(CodeError::Db(e)),
            }
        }

        Err(CodeError::GenerationExhausted(attempts))
    }

    /// Revokes a code. Existing sessions are cut off on their next access
    /// check, not forcibly here.
    pub async fn revoke(&self, code: &str) -> Result<AccessCodeData, CodeError> {
        let data = self
            .context
            .database
            .revoke_code(code)
            .await
            .map_err(CodeError::Db)?;

        info!("Code {} revoked", data.code);
        Ok(data)
    }

    pub async fn code_by_code(&self, code: &str) -> Result<AccessCodeData, CodeError> {
        self.context
            .database
            .code_by_code(code)
            .await
            .map_err(CodeError::Db)
    }

    pub async fn list_by_room(&self, room_id: PrimaryKey) -> Result<Vec<AccessCodeData>, CodeError> {
        self.context
            .database
            .codes_by_room(room_id)
            .await
            .map_err(CodeError::Db)
    }

    pub async fn list_by_studio(
        &self,
        studio_id: PrimaryKey,
    ) -> Result<Vec<AccessCodeData>, CodeError> {
        self.context
            .database
            .codes_by_studio(studio_id)
            .await
            .map_err(CodeError::Db)
    }

    pub async fn list_by_creator(
        &self,
        user_id: PrimaryKey,
    ) -> Result<Vec<AccessCodeData>, CodeError> {
        self.context
            .database
            .codes_by_creator(user_id)
            .await
            .map_err(CodeError::Db)
    }

    /// Viewer counters for a code that exists. Digits resolve to their
    /// most recent holder; the numbers are kept per record, so a reissue
    /// starts from zero.
    pub async fn analytics(&self, code: &str) -> Result<CodeAnalytics, CodeError> {
        let data = self.code_by_code(code).await?;
        Ok(self.context.analytics.snapshot(data.id))
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::{Gateway, GatewayConfig, MemoryDatabase, MemoryDirectory};

    fn gateway() -> Gateway<MemoryDatabase, MemoryDirectory> {
        Gateway::new(
            MemoryDatabase::new(),
            MemoryDirectory::new(),
            GatewayConfig::default(),
        )
    }

    fn room_code() -> NewCode {
        NewCode {
            scope: CodeScope::Room,
            target_id: 1,
            created_by: 7,
            expires_at: Utc::now() + Duration::hours(1),
            max_viewers: 0,
            label: "premiere".to_string(),
        }
    }

    #[tokio::test]
    async fn created_codes_are_well_formed_and_indexed() {
        let gateway = gateway();

        let code = gateway.codes.create_code(room_code()).await.unwrap();

        assert!(CODE_PATTERN.is_match(&code.code));
        assert!(!is_weak_pattern(&code.code));
        assert!(!code.revoked);

        let listed = gateway.codes.list_by_room(1).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].code, code.code);

        let by_creator = gateway.codes.list_by_creator(7).await.unwrap();
        assert_eq!(by_creator.len(), 1);
    }

    #[tokio::test]
    async fn expiration_must_be_in_the_future() {
        let gateway = gateway();

        let result = gateway
            .codes
            .create_code(NewCode {
                expires_at: Utc::now() - Duration::seconds(1),
                ..room_code()
            })
            .await;

        assert!(matches!(result, Err(CodeError::InvalidExpiration)));
    }

    #[tokio::test]
    async fn revocation_flags_without_deleting() {
        let gateway = gateway();

        let code = gateway.codes.create_code(room_code()).await.unwrap();
        let revoked = gateway.codes.revoke(&code.code).await.unwrap();

        assert!(revoked.revoked);
        // Still fetchable for audit
        assert!(gateway.codes.code_by_code(&code.code).await.is_ok());
    }
}
