//! Email tracking ledger.
//!
//! Every delivery attempt appends a record. Opens and email votes update the
//! most recent record for a (type, subject, participant) key, and only ever
//! move it forward.

use std::sync::Arc;

use mediate_common::{AppError, AppResult, Clock, IdGenerator, normalize_email};
use mediate_db::{
    TrackingStore,
    entities::email_tracking::{self, DeliveryStatus, EmailType},
};

use super::stats::{EmailStats, StatsReporter};

/// Attempts to claim a free sequence number before giving up.
const MAX_SEQUENCE_ATTEMPTS: u32 = 3;

/// A delivery attempt to record.
#[derive(Debug, Clone)]
pub struct NewTrackingEntry {
    /// Kind of email
    pub email_type: EmailType,
    /// Poll ID or notice ID
    pub subject_id: String,
    /// Recipient address
    pub participant_email: String,
    /// `Sent` or `Failed`
    pub status: DeliveryStatus,
    /// Provider message ID
    pub external_id: Option<String>,
    /// Why delivery failed
    pub error_message: Option<String>,
    /// Retries spent
    pub retry_count: i32,
}

/// Tracking ledger service.
#[derive(Clone)]
pub struct TrackingLedger {
    store: Arc<dyn TrackingStore>,
    reporter: StatsReporter,
    clock: Arc<dyn Clock>,
    id_gen: IdGenerator,
}

impl TrackingLedger {
    /// Create a new tracking ledger.
    #[must_use]
    pub fn new(
        store: Arc<dyn TrackingStore>,
        reporter: StatsReporter,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            reporter,
            clock,
            id_gen: IdGenerator::new(),
        }
    }

    /// Append a record with the next sequence number for its key.
    ///
    /// Concurrent sends to one recipient race for the same sequence; the
    /// loser re-reads the key and takes the next free number.
    pub async fn record(&self, entry: NewTrackingEntry) -> AppResult<email_tracking::Model> {
        let email = normalize_email(&entry.participant_email);
        let mut attempt = 1;
        loop {
            let sequence = self
                .store
                .find_latest(entry.email_type, &entry.subject_id, &email, true)
                .await?
                .map_or(1, |latest| latest.sequence + 1);

            let now = self.clock.now().into();
            let record = email_tracking::Model {
                id: self.id_gen.generate(),
                email_type: entry.email_type,
                subject_id: entry.subject_id.clone(),
                participant_email: email.clone(),
                sequence,
                status: entry.status,
                opened: false,
                opened_at: None,
                voted_via_email: false,
                voted_via_email_at: None,
                external_id: entry.external_id.clone(),
                error_message: entry.error_message.clone(),
                retry_count: entry.retry_count,
                created_at: now,
                updated_at: now,
            };

            match self.store.insert(record).await {
                Err(AppError::Conflict(reason)) if attempt < MAX_SEQUENCE_ATTEMPTS => {
                    tracing::debug!(
                        subject_id = %entry.subject_id,
                        sequence,
                        reason = %reason,
                        "Tracking sequence taken, retrying"
                    );
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    /// Mark the latest delivered email for a key as opened.
    ///
    /// Returns whether this call changed anything. Repeated opens, opens of
    /// failed deliveries and unknown keys are silent no-ops.
    pub async fn mark_opened(
        &self,
        email_type: EmailType,
        subject_id: &str,
        email: &str,
    ) -> AppResult<bool> {
        let email = normalize_email(email);
        let Some(latest) = self
            .store
            .find_latest(email_type, subject_id, &email, false)
            .await?
        else {
            tracing::debug!(subject_id = %subject_id, "Open for unknown recipient ignored");
            return Ok(false);
        };

        if latest.opened {
            tracing::debug!(tracking_id = %latest.id, "Email already opened");
            return Ok(false);
        }

        let changed = self.store.mark_opened(&latest.id, self.clock.now()).await?;
        if changed {
            tracing::info!(
                tracking_id = %latest.id,
                email_type = %email_type,
                subject_id = %subject_id,
                "Email opened"
            );
            if let Err(e) = self.reporter.refresh(email_type, subject_id).await {
                tracing::warn!(subject_id = %subject_id, error = %e, "Failed to refresh aggregates");
            }
        }
        Ok(changed)
    }

    /// Flag the latest invitation to a participant as answered from the email.
    pub async fn mark_voted_via_email(&self, poll_id: &str, email: &str) -> AppResult<bool> {
        let email = normalize_email(email);
        let Some(latest) = self
            .store
            .find_latest(EmailType::PollInvitation, poll_id, &email, false)
            .await?
        else {
            return Ok(false);
        };

        if latest.voted_via_email {
            return Ok(false);
        }
        self.store.mark_voted(&latest.id, self.clock.now()).await
    }

    /// Fresh statistics for a poll or notice.
    pub async fn stats(&self, subject_id: &str) -> AppResult<EmailStats> {
        self.reporter.stats(subject_id).await
    }

    /// All records for a poll or notice.
    pub async fn records(&self, subject_id: &str) -> AppResult<Vec<email_tracking::Model>> {
        self.store.find_by_subject(subject_id).await
    }

    /// Remove all records for a poll or notice.
    pub async fn purge(&self, subject_id: &str) -> AppResult<u64> {
        self.store.delete_by_subject(subject_id).await
    }
}
