//! Mediation notice repository.

use std::sync::Arc;

use crate::entities::{MediationNotice, mediation_notice};
use crate::store::NoticeStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mediate_common::{AppError, AppResult};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
    prelude::DateTimeWithTimeZone, sea_query::Expr,
};

/// Mediation notice repository for database operations.
#[derive(Clone)]
pub struct MediationNoticeRepository {
    db: Arc<DatabaseConnection>,
}

impl MediationNoticeRepository {
    /// Create a new mediation notice repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl NoticeStore for MediationNoticeRepository {
    async fn create(
        &self,
        notice: mediation_notice::Model,
    ) -> AppResult<mediation_notice::Model> {
        let model = mediation_notice::ActiveModel {
            id: Set(notice.id),
            creator_id: Set(notice.creator_id),
            case_id: Set(notice.case_id),
            subject: Set(notice.subject),
            body: Set(notice.body),
            attachment_key: Set(notice.attachment_key),
            recipients: Set(notice.recipients),
            emails_sent: Set(notice.emails_sent),
            emails_opened: Set(notice.emails_opened),
            sent_at: Set(notice.sent_at),
            created_at: Set(notice.created_at),
        };

        model
            .insert(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn find_by_id(&self, id: &str) -> AppResult<Option<mediation_notice::Model>> {
        MediationNotice::find_by_id(id)
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn mark_sent(&self, id: &str, at: DateTime<Utc>) -> AppResult<()> {
        let at: DateTimeWithTimeZone = at.into();
        MediationNotice::update_many()
            .col_expr(mediation_notice::Column::SentAt, Expr::value(at))
            .filter(mediation_notice::Column::Id.eq(id))
            .exec(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    async fn update_aggregates(
        &self,
        id: &str,
        emails_sent: i32,
        emails_opened: i32,
    ) -> AppResult<()> {
        MediationNotice::update_many()
            .col_expr(mediation_notice::Column::EmailsSent, Expr::value(emails_sent))
            .col_expr(mediation_notice::Column::EmailsOpened, Expr::value(emails_opened))
            .filter(mediation_notice::Column::Id.eq(id))
            .exec(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    async fn delete(&self, id: &str) -> AppResult<()> {
        MediationNotice::delete_by_id(id)
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
    use serde_json::json;

    fn create_test_notice(id: &str) -> mediation_notice::Model {
        mediation_notice::Model {
            id: id.to_string(),
            creator_id: "user1".to_string(),
            case_id: Some("case1".to_string()),
            subject: "Mediation agreement".to_string(),
            body: "Please review the attached agreement.".to_string(),
            attachment_key: Some("cases/case1/agreement.pdf".to_string()),
            recipients: json!([{ "email": "alice@example.com", "name": "Alice" }]),
            emails_sent: 0,
            emails_opened: 0,
            sent_at: None,
            created_at: Utc::now().into(),
        }
    }

    #[tokio::test]
    async fn test_create() {
        let notice = create_test_notice("notice1");

        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[notice.clone()]])
                .into_connection(),
        );

        let repo = MediationNoticeRepository::new(db);
        let created = repo.create(notice).await.unwrap();

        assert_eq!(created.id, "notice1");
    }

    #[tokio::test]
    async fn test_find_by_id_not_found() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([Vec::<mediation_notice::Model>::new()])
                .into_connection(),
        );

        let repo = MediationNoticeRepository::new(db);
        assert!(repo.find_by_id("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_mark_sent() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_exec_results([MockExecResult {
                    last_insert_id: 0,
                    rows_affected: 1,
                }])
                .into_connection(),
        );

        let repo = MediationNoticeRepository::new(db);
        repo.mark_sent("notice1", Utc::now()).await.unwrap();
    }
}
