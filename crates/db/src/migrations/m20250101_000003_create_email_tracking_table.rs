//! Create email tracking ledger table.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(EmailTracking::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(EmailTracking::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(EmailTracking::EmailType)
                            .string_len(32)
                            .not_null(),
                    )
                    .col(ColumnDef::new(EmailTracking::SubjectId).string().not_null())
                    .col(
                        ColumnDef::new(EmailTracking::ParticipantEmail)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(EmailTracking::Sequence)
                            .integer()
                            .not_null()
                            .default(1),
                    )
                    .col(
                        ColumnDef::new(EmailTracking::Status)
                            .string_len(16)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(EmailTracking::Opened)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(EmailTracking::OpenedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(EmailTracking::VotedViaEmail)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(EmailTracking::VotedViaEmailAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(ColumnDef::new(EmailTracking::ExternalId).string().null())
                    .col(ColumnDef::new(EmailTracking::ErrorMessage).text().null())
                    .col(
                        ColumnDef::new(EmailTracking::RetryCount)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(EmailTracking::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(EmailTracking::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        // One row per attempt number; also serves latest-attempt lookups
        manager
            .create_index(
                Index::create()
                    .name("idx_email_tracking_key_sequence")
                    .table(EmailTracking::Table)
                    .col(EmailTracking::EmailType)
                    .col(EmailTracking::SubjectId)
                    .col(EmailTracking::ParticipantEmail)
                    .col(EmailTracking::Sequence)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_email_tracking_subject_id")
                    .table(EmailTracking::Table)
                    .col(EmailTracking::SubjectId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(EmailTracking::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
pub enum EmailTracking {
    Table,
    Id,
    EmailType,
    SubjectId,
    ParticipantEmail,
    Sequence,
    Status,
    Opened,
    OpenedAt,
    VotedViaEmail,
    VotedViaEmailAt,
    ExternalId,
    ErrorMessage,
    RetryCount,
    CreatedAt,
    UpdatedAt,
}
