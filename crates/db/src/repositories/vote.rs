//! Vote repository.

use std::sync::Arc;

use crate::entities::{Vote, vote};
use crate::store::VoteStore;
use async_trait::async_trait;
use mediate_common::{AppError, AppResult};
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};

/// Vote repository for database operations.
#[derive(Clone)]
pub struct VoteRepository {
    db: Arc<DatabaseConnection>,
}

impl VoteRepository {
    /// Create a new vote repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

fn to_active(model: vote::Model) -> vote::ActiveModel {
    vote::ActiveModel {
        id: Set(model.id),
        poll_id: Set(model.poll_id),
        option_id: Set(model.option_id),
        participant_email: Set(model.participant_email),
        vote_type: Set(model.vote_type),
        source: Set(model.source),
        created_at: Set(model.created_at),
    }
}

#[async_trait]
impl VoteStore for VoteRepository {
    async fn replace_votes(
        &self,
        poll_id: &str,
        participant_email: &str,
        votes: Vec<vote::Model>,
    ) -> AppResult<()> {
        let txn = self
            .db
            .begin()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Vote::delete_many()
            .filter(vote::Column::PollId.eq(poll_id))
            .filter(vote::Column::ParticipantEmail.eq(participant_email))
            .exec(&txn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        if !votes.is_empty() {
            Vote::insert_many(votes.into_iter().map(to_active))
                .exec_without_returning(&txn)
                .await
                .map_err(|e| AppError::Database(e.to_string()))?;
        }

        // Dropping an uncommitted transaction rolls it back.
        txn.commit()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn find_by_participant(
        &self,
        poll_id: &str,
        participant_email: &str,
    ) -> AppResult<Vec<vote::Model>> {
        Vote::find()
            .filter(vote::Column::PollId.eq(poll_id))
            .filter(vote::Column::ParticipantEmail.eq(participant_email))
            .order_by_asc(vote::Column::Id)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn find_by_poll(&self, poll_id: &str) -> AppResult<Vec<vote::Model>> {
        Vote::find()
            .filter(vote::Column::PollId.eq(poll_id))
            .order_by_asc(vote::Column::Id)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn delete_by_poll(&self, poll_id: &str) -> AppResult<u64> {
        let result = Vote::delete_many()
            .filter(vote::Column::PollId.eq(poll_id))
            .exec(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(result.rows_affected)
    }
}
