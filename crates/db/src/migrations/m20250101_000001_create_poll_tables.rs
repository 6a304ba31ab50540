//! Create poll, option, participant and vote tables.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Poll::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Poll::Id).string().not_null().primary_key())
                    .col(ColumnDef::new(Poll::CreatorId).string().not_null())
                    .col(ColumnDef::new(Poll::CaseId).string().null())
                    .col(ColumnDef::new(Poll::Title).string().not_null())
                    .col(ColumnDef::new(Poll::Description).text().null())
                    .col(ColumnDef::new(Poll::OrganizerName).string().not_null())
                    .col(
                        ColumnDef::new(Poll::Status)
                            .string_len(16)
                            .not_null()
                            .default("draft"),
                    )
                    .col(ColumnDef::new(Poll::FinalizedOptionId).string().null())
                    .col(
                        ColumnDef::new(Poll::EmailsSent)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Poll::EmailsOpened)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Poll::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(ColumnDef::new(Poll::UpdatedAt).timestamp_with_time_zone().null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_poll_creator_id")
                    .table(Poll::Table)
                    .col(Poll::CreatorId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(PollOption::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(PollOption::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(PollOption::PollId).string().not_null())
                    .col(ColumnDef::new(PollOption::Position).integer().not_null())
                    .col(
                        ColumnDef::new(PollOption::StartsAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(PollOption::EndsAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(ColumnDef::new(PollOption::Label).string().null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_poll_option_poll")
                            .from(PollOption::Table, PollOption::PollId)
                            .to(Poll::Table, Poll::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_poll_option_poll_position")
                    .table(PollOption::Table)
                    .col(PollOption::PollId)
                    .col(PollOption::Position)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(PollParticipant::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(PollParticipant::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(PollParticipant::PollId).string().not_null())
                    .col(ColumnDef::new(PollParticipant::Email).string().not_null())
                    .col(ColumnDef::new(PollParticipant::Name).string().null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_poll_participant_poll")
                            .from(PollParticipant::Table, PollParticipant::PollId)
                            .to(Poll::Table, Poll::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_poll_participant_poll_email")
                    .table(PollParticipant::Table)
                    .col(PollParticipant::PollId)
                    .col(PollParticipant::Email)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Vote::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Vote::Id).string().not_null().primary_key())
                    .col(ColumnDef::new(Vote::PollId).string().not_null())
                    .col(ColumnDef::new(Vote::OptionId).string().not_null())
                    .col(ColumnDef::new(Vote::ParticipantEmail).string().not_null())
                    .col(ColumnDef::new(Vote::VoteType).string_len(16).not_null())
                    .col(
                        ColumnDef::new(Vote::Source)
                            .string_len(32)
                            .not_null()
                            .default("email"),
                    )
                    .col(
                        ColumnDef::new(Vote::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_vote_poll")
                            .from(Vote::Table, Vote::PollId)
                            .to(Poll::Table, Poll::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_vote_option")
                            .from(Vote::Table, Vote::OptionId)
                            .to(PollOption::Table, PollOption::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // One answer per option per participant
        manager
            .create_index(
                Index::create()
                    .name("idx_vote_poll_participant_option")
                    .table(Vote::Table)
                    .col(Vote::PollId)
                    .col(Vote::ParticipantEmail)
                    .col(Vote::OptionId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Vote::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(PollParticipant::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(PollOption::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Poll::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
pub enum Poll {
    Table,
    Id,
    CreatorId,
    CaseId,
    Title,
    Description,
    OrganizerName,
    Status,
    FinalizedOptionId,
    EmailsSent,
    EmailsOpened,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden)]
pub enum PollOption {
    Table,
    Id,
    PollId,
    Position,
    StartsAt,
    EndsAt,
    Label,
}

#[derive(Iden)]
pub enum PollParticipant {
    Table,
    Id,
    PollId,
    Email,
    Name,
}

#[derive(Iden)]
pub enum Vote {
    Table,
    Id,
    PollId,
    OptionId,
    ParticipantEmail,
    VoteType,
    Source,
    CreatedAt,
}
