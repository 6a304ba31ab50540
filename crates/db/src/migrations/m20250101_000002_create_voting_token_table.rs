//! Create voting token table.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(VotingToken::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(VotingToken::Key)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(VotingToken::PollId).string().not_null())
                    .col(
                        ColumnDef::new(VotingToken::ParticipantEmail)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(VotingToken::Token).string().not_null())
                    .col(
                        ColumnDef::new(VotingToken::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(VotingToken::ExpiresAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_voting_token_poll_id")
                    .table(VotingToken::Table)
                    .col(VotingToken::PollId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(VotingToken::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
pub enum VotingToken {
    Table,
    Key,
    PollId,
    ParticipantEmail,
    Token,
    CreatedAt,
    ExpiresAt,
}
