//! Aggregation of tracking ledger records.
//!
//! Statistics are always recomputed from the ledger. The counters stored on
//! polls and notices are a cache written only by [`StatsReporter::refresh`].

use std::collections::BTreeMap;
use std::sync::Arc;

use mediate_common::AppResult;
use mediate_db::{
    NoticeStore, PollStore, TrackingStore,
    entities::email_tracking::{self, DeliveryStatus, EmailType},
};
use serde::Serialize;

/// Counts for one email type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeStats {
    /// All records
    pub total: u64,
    /// Delivered, not opened yet
    pub sent: u64,
    /// `sent + opened`
    pub delivered: u64,
    /// Opened
    pub opened: u64,
    /// Failed delivery
    pub failed: u64,
}

impl TypeStats {
    fn add(&mut self, status: DeliveryStatus) {
        self.total += 1;
        match status {
            DeliveryStatus::Sent => {
                self.sent += 1;
                self.delivered += 1;
            }
            DeliveryStatus::Opened => {
                self.opened += 1;
                self.delivered += 1;
            }
            DeliveryStatus::Failed => self.failed += 1,
        }
    }
}

/// Engagement statistics for a poll or notice.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailStats {
    /// All records
    pub total: u64,
    /// Delivered, not opened yet
    pub sent: u64,
    /// `sent + opened`
    pub delivered: u64,
    /// Opened
    pub opened: u64,
    /// Failed delivery
    pub failed: u64,
    /// `delivered / total`, 0 when there are no records
    pub delivery_rate: f64,
    /// `opened / delivered`, 0 when nothing was delivered
    pub open_rate: f64,
    /// Breakdown keyed by email type
    pub by_type: BTreeMap<String, TypeStats>,
}

fn ratio(numerator: u64, denominator: u64) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

/// Compute statistics over a set of ledger records.
#[must_use]
pub fn compute(records: &[email_tracking::Model]) -> EmailStats {
    let mut totals = TypeStats::default();
    let mut by_type: BTreeMap<String, TypeStats> = BTreeMap::new();

    for record in records {
        totals.add(record.status);
        by_type
            .entry(record.email_type.as_str().to_string())
            .or_default()
            .add(record.status);
    }

    EmailStats {
        total: totals.total,
        sent: totals.sent,
        delivered: totals.delivered,
        opened: totals.opened,
        failed: totals.failed,
        delivery_rate: ratio(totals.delivered, totals.total),
        open_rate: ratio(totals.opened, totals.delivered),
        by_type,
    }
}

/// Recomputes statistics and writes them back onto polls and notices.
#[derive(Clone)]
pub struct StatsReporter {
    tracking: Arc<dyn TrackingStore>,
    polls: Arc<dyn PollStore>,
    notices: Arc<dyn NoticeStore>,
}

impl StatsReporter {
    /// Create a new stats reporter.
    #[must_use]
    pub fn new(
        tracking: Arc<dyn TrackingStore>,
        polls: Arc<dyn PollStore>,
        notices: Arc<dyn NoticeStore>,
    ) -> Self {
        Self {
            tracking,
            polls,
            notices,
        }
    }

    /// Fresh statistics for a poll or notice.
    pub async fn stats(&self, subject_id: &str) -> AppResult<EmailStats> {
        let records = self.tracking.find_by_subject(subject_id).await?;
        Ok(compute(&records))
    }

    /// Recompute and store `emails_sent` / `emails_opened` on the parent row.
    pub async fn refresh(&self, email_type: EmailType, subject_id: &str) -> AppResult<EmailStats> {
        let records: Vec<_> = self
            .tracking
            .find_by_subject(subject_id)
            .await?
            .into_iter()
            .filter(|r| r.email_type == email_type)
            .collect();
        let stats = compute(&records);

        let emails_sent = i32::try_from(stats.delivered).unwrap_or(i32::MAX);
        let emails_opened = i32::try_from(stats.opened).unwrap_or(i32::MAX);

        match email_type {
            EmailType::PollInvitation => {
                self.polls
                    .update_aggregates(subject_id, emails_sent, emails_opened)
                    .await?;
            }
            EmailType::MediationNotice => {
                self.notices
                    .update_aggregates(subject_id, emails_sent, emails_opened)
                    .await?;
            }
        }

        tracing::debug!(
            subject_id = %subject_id,
            email_type = %email_type,
            emails_sent,
            emails_opened,
            "Refreshed email aggregates"
        );
        Ok(stats)
    }
}
