//! Mediation notice service.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use mediate_common::{
    AppError, AppResult, BlobAccess, BlobStore, Clock, IdGenerator, SignedUrl, normalize_email,
    storage::generate_storage_key,
};
use mediate_db::{
    NoticeStore,
    entities::{email_tracking::EmailType, mediation_notice},
};
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::delivery::{BulkSendReport, DeliveryEngine};
use super::email::Mailbox;
use super::poll::ParticipantInput;
use super::render::{self, NoticeEmail};
use super::tracking::TrackingLedger;

/// Maximum number of recipients per notice.
const MAX_RECIPIENTS: usize = 500;

/// Input for creating a notice.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateNoticeInput {
    /// Subject line
    #[validate(length(min = 1, max = 300))]
    pub subject: String,
    /// Plain text body
    #[validate(length(min = 1, max = 20000))]
    pub body: String,
    /// Case the notice belongs to
    #[serde(default)]
    pub case_id: Option<String>,
    /// Blob key of an uploaded document
    #[serde(default)]
    pub attachment_key: Option<String>,
    /// Recipients
    #[validate(nested)]
    pub recipients: Vec<ParticipantInput>,
}

/// Where and until when a document may be uploaded.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadTicket {
    /// Blob key to reference as `attachmentKey`
    pub key: String,
    /// Signed upload URL
    pub url: String,
    /// Instant after which the URL stops working
    pub expires_at: DateTime<Utc>,
}

/// Mediation notice service.
#[derive(Clone)]
pub struct NoticeService {
    notices: Arc<dyn NoticeStore>,
    ledger: TrackingLedger,
    delivery: DeliveryEngine,
    blobs: Arc<dyn BlobStore>,
    clock: Arc<dyn Clock>,
    base_url: String,
    url_ttl: Duration,
    id_gen: IdGenerator,
}

impl NoticeService {
    /// Create a new notice service.
    #[must_use]
    pub fn new(
        notices: Arc<dyn NoticeStore>,
        ledger: TrackingLedger,
        delivery: DeliveryEngine,
        blobs: Arc<dyn BlobStore>,
        clock: Arc<dyn Clock>,
        base_url: String,
        url_ttl: Duration,
    ) -> Self {
        Self {
            notices,
            ledger,
            delivery,
            blobs,
            clock,
            base_url,
            url_ttl,
            id_gen: IdGenerator::new(),
        }
    }

    /// Create a notice. An attachment must already be uploaded.
    pub async fn create(
        &self,
        creator_id: &str,
        mut input: CreateNoticeInput,
    ) -> AppResult<mediation_notice::Model> {
        for recipient in &mut input.recipients {
            recipient.email = normalize_email(&recipient.email);
        }
        input.validate()?;

        if input.recipients.is_empty() {
            return Err(AppError::Validation(
                "Notice must have at least one recipient".to_string(),
            ));
        }
        if input.recipients.len() > MAX_RECIPIENTS {
            return Err(AppError::Validation(format!(
                "Notice cannot have more than {MAX_RECIPIENTS} recipients"
            )));
        }

        let attachment_key = input.attachment_key.filter(|k| !k.trim().is_empty());
        if let Some(key) = &attachment_key
            && !self.blobs.exists(key).await?
        {
            return Err(AppError::Validation(format!("Attachment {key} was not uploaded")));
        }

        let mut seen = HashSet::new();
        let recipients: Vec<Mailbox> = input
            .recipients
            .into_iter()
            .filter(|r| seen.insert(r.email.clone()))
            .map(|r| Mailbox::new(r.email, r.name.filter(|n| !n.trim().is_empty())))
            .collect();
        let recipients = serde_json::to_value(recipients)
            .map_err(|e| AppError::Internal(format!("Failed to encode recipients: {e}")))?;

        let notice = mediation_notice::Model {
            id: self.id_gen.generate(),
            creator_id: creator_id.to_string(),
            case_id: input.case_id,
            subject: input.subject.trim().to_string(),
            body: input.body,
            attachment_key,
            recipients,
            emails_sent: 0,
            emails_opened: 0,
            sent_at: None,
            created_at: self.clock.now().into(),
        };

        let notice = self.notices.create(notice).await?;
        tracing::info!(notice_id = %notice.id, creator_id = %creator_id, "Notice created");
        Ok(notice)
    }

    /// Get a notice owned by `actor_id`.
    pub async fn get(&self, actor_id: &str, notice_id: &str) -> AppResult<mediation_notice::Model> {
        let notice = self
            .notices
            .find_by_id(notice_id)
            .await?
            .ok_or_else(|| AppError::NoticeNotFound(notice_id.to_string()))?;
        if notice.creator_id != actor_id {
            return Err(AppError::Forbidden(
                "Only the notice creator can manage this notice".to_string(),
            ));
        }
        Ok(notice)
    }

    /// Email the notice to every recipient. Sending again appends new records.
    pub async fn send(&self, actor_id: &str, notice_id: &str) -> AppResult<BulkSendReport> {
        let notice = self.get(actor_id, notice_id).await?;
        let recipients = recipients_of(&notice)?;

        let attachment = match &notice.attachment_key {
            Some(key) => Some(self.blobs.signed_url(key, BlobAccess::Read, self.url_ttl).await?),
            None => None,
        };

        let base_url = self.base_url.as_str();
        let report = self
            .delivery
            .send_bulk(
                EmailType::MediationNotice,
                notice_id,
                &recipients,
                |recipient, _| {
                    Ok(render::mediation_notice(&NoticeEmail {
                        notice: &notice,
                        recipient,
                        attachment: attachment.as_ref(),
                        base_url,
                    }))
                },
            )
            .await;

        if report.sent > 0 {
            self.notices.mark_sent(notice_id, self.clock.now()).await?;
        }

        tracing::info!(
            notice_id = %notice_id,
            sent = report.sent,
            failed = report.failed,
            "Notice sent"
        );
        Ok(report)
    }

    /// Signed URL for uploading a document for a case.
    pub async fn upload_url(&self, case_id: &str, filename: &str) -> AppResult<UploadTicket> {
        if case_id.trim().is_empty() || case_id.contains('/') {
            return Err(AppError::Validation("Invalid case ID".to_string()));
        }
        let key = generate_storage_key(case_id, filename);
        let SignedUrl { url, expires_at } =
            self.blobs.signed_url(&key, BlobAccess::Write, self.url_ttl).await?;
        Ok(UploadTicket {
            key,
            url,
            expires_at,
        })
    }

    /// Delete a notice with its tracking records.
    pub async fn delete(&self, actor_id: &str, notice_id: &str) -> AppResult<()> {
        let notice = self.get(actor_id, notice_id).await?;

        let records = self.ledger.purge(notice_id).await?;
        self.notices.delete(notice_id).await?;

        if let Some(key) = &notice.attachment_key
            && let Err(e) = self.blobs.delete(key).await
        {
            tracing::warn!(notice_id = %notice_id, key = %key, error = %e, "Failed to delete attachment");
        }

        tracing::info!(notice_id = %notice_id, records, "Notice deleted");
        Ok(())
    }
}

fn recipients_of(notice: &mediation_notice::Model) -> AppResult<Vec<Mailbox>> {
    serde_json::from_value(notice.recipients.clone())
        .map_err(|e| AppError::Internal(format!("Corrupt recipients on notice {}: {e}", notice.id)))
}
