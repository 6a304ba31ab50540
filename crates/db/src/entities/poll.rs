//! Scheduling poll entity.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Poll lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "snake_case")]
pub enum PollStatus {
    #[sea_orm(string_value = "draft")]
    Draft,
    #[sea_orm(string_value = "active")]
    Active,
    #[sea_orm(string_value = "finalized")]
    Finalized,
}

impl std::fmt::Display for PollStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Draft => "draft",
            Self::Active => "active",
            Self::Finalized => "finalized",
        };
        write!(f, "{s}")
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "poll")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    /// User who created the poll; only they may manage it
    #[sea_orm(indexed)]
    pub creator_id: String,

    /// Case the poll belongs to
    #[sea_orm(nullable)]
    pub case_id: Option<String>,

    pub title: String,

    #[sea_orm(column_type = "Text", nullable)]
    pub description: Option<String>,

    /// Name shown as the sender of invitations
    pub organizer_name: String,

    pub status: PollStatus,

    /// Winning option once finalized
    #[sea_orm(nullable)]
    pub finalized_option_id: Option<String>,

    /// Derived from the tracking ledger
    pub emails_sent: i32,

    /// Derived from the tracking ledger
    pub emails_opened: i32,

    pub created_at: DateTimeWithTimeZone,

    #[sea_orm(nullable)]
    pub updated_at: Option<DateTimeWithTimeZone>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::poll_option::Entity")]
    PollOption,
    #[sea_orm(has_many = "super::poll_participant::Entity")]
    PollParticipant,
    #[sea_orm(has_many = "super::vote::Entity")]
    Vote,
}

impl Related<super::poll_option::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PollOption.def()
    }
}

impl Related<super::poll_participant::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PollParticipant.def()
    }
}

impl Related<super::vote::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Vote.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
