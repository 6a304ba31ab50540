//! Poll repository.

use std::sync::Arc;

use crate::entities::{
    Poll, PollOption, PollParticipant,
    poll::{self, PollStatus},
    poll_option, poll_participant,
};
use crate::store::{NewPoll, PollStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mediate_common::{AppError, AppResult};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, IntoActiveModel, QueryFilter,
    QueryOrder, Set, TransactionTrait, sea_query::Expr,
};

/// Poll repository for database operations.
#[derive(Clone)]
pub struct PollRepository {
    db: Arc<DatabaseConnection>,
}

impl PollRepository {
    /// Create a new poll repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Get a poll by ID, returning error if not found.
    pub async fn get_by_id(&self, id: &str) -> AppResult<poll::Model> {
        self.find_by_id(id)
            .await?
            .ok_or_else(|| AppError::PollNotFound(id.to_string()))
    }
}

#[async_trait]
impl PollStore for PollRepository {
    async fn create(&self, new_poll: NewPoll) -> AppResult<poll::Model> {
        let NewPoll {
            poll,
            options,
            participants,
        } = new_poll;

        let txn = self
            .db
            .begin()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        let created = poll::ActiveModel {
            id: Set(poll.id),
            creator_id: Set(poll.creator_id),
            case_id: Set(poll.case_id),
            title: Set(poll.title),
            description: Set(poll.description),
            organizer_name: Set(poll.organizer_name),
            status: Set(poll.status),
            finalized_option_id: Set(poll.finalized_option_id),
            emails_sent: Set(poll.emails_sent),
            emails_opened: Set(poll.emails_opened),
            created_at: Set(poll.created_at),
            updated_at: Set(poll.updated_at),
        }
        .insert(&txn)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        if !options.is_empty() {
            PollOption::insert_many(options.into_iter().map(|o| poll_option::ActiveModel {
                id: Set(o.id),
                poll_id: Set(o.poll_id),
                position: Set(o.position),
                starts_at: Set(o.starts_at),
                ends_at: Set(o.ends_at),
                label: Set(o.label),
            }))
            .exec_without_returning(&txn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        }

        if !participants.is_empty() {
            PollParticipant::insert_many(participants.into_iter().map(|p| {
                poll_participant::ActiveModel {
                    id: Set(p.id),
                    poll_id: Set(p.poll_id),
                    email: Set(p.email),
                    name: Set(p.name),
                }
            }))
            .exec_without_returning(&txn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        }

        txn.commit()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(created)
    }

    async fn find_by_id(&self, id: &str) -> AppResult<Option<poll::Model>> {
        Poll::find_by_id(id)
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn find_options(&self, poll_id: &str) -> AppResult<Vec<poll_option::Model>> {
        PollOption::find()
            .filter(poll_option::Column::PollId.eq(poll_id))
            .order_by_asc(poll_option::Column::Position)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn find_participants(
        &self,
        poll_id: &str,
    ) -> AppResult<Vec<poll_participant::Model>> {
        PollParticipant::find()
            .filter(poll_participant::Column::PollId.eq(poll_id))
            .order_by_asc(poll_participant::Column::Email)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn update_status(
        &self,
        id: &str,
        status: PollStatus,
        finalized_option_id: Option<String>,
        at: DateTime<Utc>,
    ) -> AppResult<poll::Model> {
        let mut model = self.get_by_id(id).await?.into_active_model();
        model.status = Set(status);
        model.finalized_option_id = Set(finalized_option_id);
        model.updated_at = Set(Some(at.into()));

        model
            .update(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn update_aggregates(
        &self,
        id: &str,
        emails_sent: i32,
        emails_opened: i32,
    ) -> AppResult<()> {
        Poll::update_many()
            .col_expr(poll::Column::EmailsSent, Expr::value(emails_sent))
            .col_expr(poll::Column::EmailsOpened, Expr::value(emails_opened))
            .filter(poll::Column::Id.eq(id))
            .exec(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    async fn delete(&self, id: &str) -> AppResult<()> {
        // Options, participants and votes go with the poll via ON DELETE CASCADE.
        Poll::delete_by_id(id)
            .exec(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};

    fn create_test_poll(id: &str, status: PollStatus) -> poll::Model {
        poll::Model {
            id: id.to_string(),
            creator_id: "user1".to_string(),
            case_id: Some("case1".to_string()),
            title: "Mediation session".to_string(),
            description: None,
            organizer_name: "Dana Mediator".to_string(),
            status,
            finalized_option_id: None,
            emails_sent: 0,
            emails_opened: 0,
            created_at: Utc::now().into(),
            updated_at: None,
        }
    }

    fn create_test_option(id: &str, position: i32) -> poll_option::Model {
        poll_option::Model {
            id: id.to_string(),
            poll_id: "poll1".to_string(),
            position,
            starts_at: Utc::now().into(),
            ends_at: None,
            label: None,
        }
    }

    #[tokio::test]
    async fn test_find_by_id() {
        let poll = create_test_poll("poll1", PollStatus::Active);

        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[poll.clone()]])
                .into_connection(),
        );

        let repo = PollRepository::new(db);
        let result = repo.find_by_id("poll1").await.unwrap();

        assert!(result.is_some());
        assert_eq!(result.unwrap().title, "Mediation session");
    }

    #[tokio::test]
    async fn test_get_by_id_not_found() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([Vec::<poll::Model>::new()])
                .into_connection(),
        );

        let repo = PollRepository::new(db);
        let result = repo.get_by_id("missing").await;

        assert!(matches!(result, Err(AppError::PollNotFound(_))));
    }

    #[tokio::test]
    async fn test_find_options_ordered() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[create_test_option("opt1", 0), create_test_option("opt2", 1)]])
                .into_connection(),
        );

        let repo = PollRepository::new(db);
        let options = repo.find_options("poll1").await.unwrap();

        assert_eq!(options.len(), 2);
        assert_eq!(options[0].position, 0);
    }

    #[tokio::test]
    async fn test_update_status() {
        let draft = create_test_poll("poll1", PollStatus::Draft);
        let mut active = draft.clone();
        active.status = PollStatus::Active;

        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[draft], [active]])
                .into_connection(),
        );

        let repo = PollRepository::new(db);
        let updated = repo
            .update_status("poll1", PollStatus::Active, None, Utc::now())
            .await
            .unwrap();

        assert_eq!(updated.status, PollStatus::Active);
    }

    #[tokio::test]
    async fn test_update_aggregates() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_exec_results([MockExecResult {
                    last_insert_id: 0,
                    rows_affected: 1,
                }])
                .into_connection(),
        );

        let repo = PollRepository::new(db);
        repo.update_aggregates("poll1", 4, 2).await.unwrap();
    }
}
