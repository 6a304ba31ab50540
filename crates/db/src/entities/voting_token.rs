//! Voting token entity.
//!
//! One row per (poll, participant). The key embeds a hash of the normalized
//! address so that distinct addresses never share a row.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "voting_token")]
pub struct Model {
    /// `{poll_id}:{sha256(normalized email)}`
    #[sea_orm(primary_key, auto_increment = false)]
    pub key: String,

    #[sea_orm(indexed)]
    pub poll_id: String,

    pub participant_email: String,

    #[serde(skip_serializing)]
    pub token: String,

    pub created_at: DateTimeWithTimeZone,

    pub expires_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
