//! A participant's answer for one poll option.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Answer given for a time option.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "snake_case")]
pub enum VoteType {
    #[sea_orm(string_value = "yes")]
    Yes,
    #[sea_orm(string_value = "if_need_be")]
    IfNeedBe,
    #[sea_orm(string_value = "no")]
    No,
}

impl VoteType {
    /// Parse a submitted form value. Unknown values yield `None`.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "yes" => Some(Self::Yes),
            "if_need_be" => Some(Self::IfNeedBe),
            "no" => Some(Self::No),
            _ => None,
        }
    }

    /// Contribution to an option's score.
    #[must_use]
    pub const fn weight(self) -> i64 {
        match self {
            Self::Yes => 2,
            Self::IfNeedBe => 1,
            Self::No => 0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "vote")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    #[sea_orm(indexed)]
    pub poll_id: String,

    pub option_id: String,

    /// Normalized voter address
    pub participant_email: String,

    pub vote_type: VoteType,

    /// Where the vote came from (e.g. "email")
    pub source: String,

    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::poll::Entity",
        from = "Column::PollId",
        to = "super::poll::Column::Id",
        on_delete = "Cascade"
    )]
    Poll,
}

impl Related<super::poll::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Poll.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
