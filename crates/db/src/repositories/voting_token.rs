//! Voting token repository.

use std::sync::Arc;

use crate::entities::{VotingToken, voting_token};
use crate::store::VotingTokenStore;
use async_trait::async_trait;
use mediate_common::{AppError, AppResult};
use sea_orm::{DatabaseConnection, EntityTrait, Set, sea_query::OnConflict};

/// Voting token repository for database operations.
#[derive(Clone)]
pub struct VotingTokenRepository {
    db: Arc<DatabaseConnection>,
}

impl VotingTokenRepository {
    /// Create a new voting token repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl VotingTokenStore for VotingTokenRepository {
    async fn upsert(&self, token: voting_token::Model) -> AppResult<()> {
        let model = voting_token::ActiveModel {
            key: Set(token.key),
            poll_id: Set(token.poll_id),
            participant_email: Set(token.participant_email),
            token: Set(token.token),
            created_at: Set(token.created_at),
            expires_at: Set(token.expires_at),
        };

        VotingToken::insert(model)
            .on_conflict(
                OnConflict::column(voting_token::Column::Key)
                    .update_columns([
                        voting_token::Column::Token,
                        voting_token::Column::ParticipantEmail,
                        voting_token::Column::CreatedAt,
                        voting_token::Column::ExpiresAt,
                    ])
                    .to_owned(),
            )
            .exec_without_returning(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    async fn find(&self, key: &str) -> AppResult<Option<voting_token::Model>> {
        VotingToken::find_by_id(key)
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }
}
