//! Mediation notice entity.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "mediation_notice")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    #[sea_orm(indexed)]
    pub creator_id: String,

    #[sea_orm(nullable)]
    pub case_id: Option<String>,

    pub subject: String,

    #[sea_orm(column_type = "Text")]
    pub body: String,

    /// Blob key of the attached document
    #[sea_orm(nullable)]
    pub attachment_key: Option<String>,

    /// Recipients (JSON array of `{ "email": ..., "name": ... }`)
    #[sea_orm(column_type = "Json")]
    pub recipients: JsonValue,

    /// Derived from the tracking ledger
    pub emails_sent: i32,

    /// Derived from the tracking ledger
    pub emails_opened: i32,

    #[sea_orm(nullable)]
    pub sent_at: Option<DateTimeWithTimeZone>,

    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
