//! Email tracking ledger entity.
//!
//! One row per attempt to deliver one logical email to one recipient.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Kind of email being tracked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "snake_case")]
pub enum EmailType {
    #[sea_orm(string_value = "poll_invitation")]
    PollInvitation,
    #[sea_orm(string_value = "mediation_notice")]
    MediationNotice,
}

impl EmailType {
    /// Parse the wire name used in tracking links.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "poll_invitation" | "poll" => Some(Self::PollInvitation),
            "mediation_notice" | "notice" => Some(Self::MediationNotice),
            _ => None,
        }
    }

    /// Wire name used in tracking links and stats.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PollInvitation => "poll_invitation",
            Self::MediationNotice => "mediation_notice",
        }
    }
}

impl std::fmt::Display for EmailType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Delivery state of a ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    #[sea_orm(string_value = "sent")]
    Sent,
    #[sea_orm(string_value = "failed")]
    Failed,
    #[sea_orm(string_value = "opened")]
    Opened,
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "email_tracking")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    pub email_type: EmailType,

    /// Poll ID or notice ID
    #[sea_orm(indexed)]
    pub subject_id: String,

    /// Normalized recipient address
    pub participant_email: String,

    /// 1-based attempt number for (type, subject, participant)
    pub sequence: i32,

    pub status: DeliveryStatus,

    pub opened: bool,

    #[sea_orm(nullable)]
    pub opened_at: Option<DateTimeWithTimeZone>,

    pub voted_via_email: bool,

    #[sea_orm(nullable)]
    pub voted_via_email_at: Option<DateTimeWithTimeZone>,

    /// Provider-assigned message ID
    #[sea_orm(nullable)]
    pub external_id: Option<String>,

    #[sea_orm(column_type = "Text", nullable)]
    pub error_message: Option<String>,

    /// Transport retries spent on this attempt
    pub retry_count: i32,

    pub created_at: DateTimeWithTimeZone,

    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
