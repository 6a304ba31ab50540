//! Email tracking ledger repository.

use std::sync::Arc;

use crate::entities::{
    EmailTracking,
    email_tracking::{self, DeliveryStatus, EmailType},
};
use crate::store::TrackingStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mediate_common::{AppError, AppResult};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
    SqlErr, prelude::DateTimeWithTimeZone, sea_query::Expr,
};

/// Email tracking repository for database operations.
#[derive(Clone)]
pub struct EmailTrackingRepository {
    db: Arc<DatabaseConnection>,
}

impl EmailTrackingRepository {
    /// Create a new email tracking repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl TrackingStore for EmailTrackingRepository {
    async fn insert(&self, record: email_tracking::Model) -> AppResult<email_tracking::Model> {
        let model = email_tracking::ActiveModel {
            id: Set(record.id),
            email_type: Set(record.email_type),
            subject_id: Set(record.subject_id),
            participant_email: Set(record.participant_email),
            sequence: Set(record.sequence),
            status: Set(record.status),
            opened: Set(record.opened),
            opened_at: Set(record.opened_at),
            voted_via_email: Set(record.voted_via_email),
            voted_via_email_at: Set(record.voted_via_email_at),
            external_id: Set(record.external_id),
            error_message: Set(record.error_message),
            retry_count: Set(record.retry_count),
            created_at: Set(record.created_at),
            updated_at: Set(record.updated_at),
        };

        model.insert(self.db.as_ref()).await.map_err(|e| match e.sql_err() {
            Some(SqlErr::UniqueConstraintViolation(detail)) => AppError::Conflict(detail),
            _ => AppError::Database(e.to_string()),
        })
    }

    async fn find_latest(
        &self,
        email_type: EmailType,
        subject_id: &str,
        participant_email: &str,
        include_failed: bool,
    ) -> AppResult<Option<email_tracking::Model>> {
        let mut query = EmailTracking::find()
            .filter(email_tracking::Column::EmailType.eq(email_type))
            .filter(email_tracking::Column::SubjectId.eq(subject_id))
            .filter(email_tracking::Column::ParticipantEmail.eq(participant_email));

        if !include_failed {
            query = query.filter(email_tracking::Column::Status.ne(DeliveryStatus::Failed));
        }

        query
            .order_by_desc(email_tracking::Column::Sequence)
            .order_by_desc(email_tracking::Column::Id)
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn mark_opened(&self, id: &str, at: DateTime<Utc>) -> AppResult<bool> {
        let at: DateTimeWithTimeZone = at.into();

        // The opened = false guard makes concurrent duplicate opens a no-op.
        let result = EmailTracking::update_many()
            .col_expr(email_tracking::Column::Opened, Expr::value(true))
            .col_expr(email_tracking::Column::OpenedAt, Expr::value(at))
            .col_expr(
                email_tracking::Column::Status,
                Expr::value(DeliveryStatus::Opened),
            )
            .col_expr(email_tracking::Column::UpdatedAt, Expr::value(at))
            .filter(email_tracking::Column::Id.eq(id))
            .filter(email_tracking::Column::Opened.eq(false))
            .filter(email_tracking::Column::Status.ne(DeliveryStatus::Failed))
            .exec(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(result.rows_affected > 0)
    }

    async fn mark_voted(&self, id: &str, at: DateTime<Utc>) -> AppResult<bool> {
        let at: DateTimeWithTimeZone = at.into();

        let result = EmailTracking::update_many()
            .col_expr(email_tracking::Column::VotedViaEmail, Expr::value(true))
            .col_expr(email_tracking::Column::VotedViaEmailAt, Expr::value(at))
            .col_expr(email_tracking::Column::UpdatedAt, Expr::value(at))
            .filter(email_tracking::Column::Id.eq(id))
            .filter(email_tracking::Column::VotedViaEmail.eq(false))
            .exec(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(result.rows_affected > 0)
    }

    async fn find_by_subject(&self, subject_id: &str) -> AppResult<Vec<email_tracking::Model>> {
        EmailTracking::find()
            .filter(email_tracking::Column::SubjectId.eq(subject_id))
            .order_by_asc(email_tracking::Column::Id)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn delete_by_subject(&self, subject_id: &str) -> AppResult<u64> {
        let result = EmailTracking::delete_many()
            .filter(email_tracking::Column::SubjectId.eq(subject_id))
            .exec(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(result.rows_affected)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};

    fn create_test_record(id: &str, sequence: i32, status: DeliveryStatus) -> email_tracking::Model {
        let now = Utc::now().into();
        email_tracking::Model {
            id: id.to_string(),
            email_type: EmailType::PollInvitation,
            subject_id: "poll1".to_string(),
            participant_email: "alice@example.com".to_string(),
            sequence,
            status,
            opened: status == DeliveryStatus::Opened,
            opened_at: None,
            voted_via_email: false,
            voted_via_email_at: None,
            external_id: Some("msg-1".to_string()),
            error_message: None,
            retry_count: 0,
            created_at: now,
            updated_at: now,
        }
    }

    fn exec_result(rows_affected: u64) -> MockExecResult {
        MockExecResult {
            last_insert_id: 0,
            rows_affected,
        }
    }

    #[tokio::test]
    async fn test_find_latest() {
        let record = create_test_record("rec2", 2, DeliveryStatus::Sent);

        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[record]])
                .into_connection(),
        );

        let repo = EmailTrackingRepository::new(db);
        let result = repo
            .find_latest(EmailType::PollInvitation, "poll1", "alice@example.com", false)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(result.id, "rec2");
        assert_eq!(result.sequence, 2);
    }

    #[tokio::test]
    async fn test_mark_opened_reports_change() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_exec_results([exec_result(1), exec_result(0)])
                .into_connection(),
        );

        let repo = EmailTrackingRepository::new(db);
        assert!(repo.mark_opened("rec1", Utc::now()).await.unwrap());
        // Second call matches no unopened row.
        assert!(!repo.mark_opened("rec1", Utc::now()).await.unwrap());
    }

    #[tokio::test]
    async fn test_find_by_subject() {
        let r1 = create_test_record("rec1", 1, DeliveryStatus::Failed);
        let r2 = create_test_record("rec2", 2, DeliveryStatus::Opened);

        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[r1, r2]])
                .into_connection(),
        );

        let repo = EmailTrackingRepository::new(db);
        let result = repo.find_by_subject("poll1").await.unwrap();

        assert_eq!(result.len(), 2);
    }

    #[tokio::test]
    async fn test_delete_by_subject() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_exec_results([exec_result(3)])
                .into_connection(),
        );

        let repo = EmailTrackingRepository::new(db);
        assert_eq!(repo.delete_by_subject("poll1").await.unwrap(), 3);
    }
}
