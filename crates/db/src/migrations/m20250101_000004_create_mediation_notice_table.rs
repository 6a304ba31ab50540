//! Create mediation notice table.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(MediationNotice::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(MediationNotice::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(MediationNotice::CreatorId).string().not_null())
                    .col(ColumnDef::new(MediationNotice::CaseId).string().null())
                    .col(ColumnDef::new(MediationNotice::Subject).string().not_null())
                    .col(ColumnDef::new(MediationNotice::Body).text().not_null())
                    .col(ColumnDef::new(MediationNotice::AttachmentKey).string().null())
                    .col(ColumnDef::new(MediationNotice::Recipients).json().not_null())
                    .col(
                        ColumnDef::new(MediationNotice::EmailsSent)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(MediationNotice::EmailsOpened)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(MediationNotice::SentAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(MediationNotice::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_mediation_notice_creator_id")
                    .table(MediationNotice::Table)
                    .col(MediationNotice::CreatorId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(MediationNotice::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
pub enum MediationNotice {
    Table,
    Id,
    CreatorId,
    CaseId,
    Subject,
    Body,
    AttachmentKey,
    Recipients,
    EmailsSent,
    EmailsOpened,
    SentAt,
    CreatedAt,
}
