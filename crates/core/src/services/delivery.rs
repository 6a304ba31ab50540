//! Email delivery engine.
//!
//! Sends rendered messages through an [`EmailTransport`] with bounded retry,
//! and fans a logical email out to many recipients while keeping each
//! recipient's failure to itself.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use mediate_common::{AppError, AppResult, config::EmailConfig, normalize_email};
use mediate_db::entities::email_tracking::{DeliveryStatus, EmailType};
use serde::Serialize;

use super::email::{DeliveryReceipt, EmailMessage, EmailTransport, Mailbox};
use super::render::RenderedEmail;
use super::stats::StatsReporter;
use super::token::VotingTokenService;
use super::tracking::{NewTrackingEntry, TrackingLedger};

/// Waits between retries.
#[async_trait]
pub trait Sleeper: Send + Sync {
    /// Sleep for `duration`.
    async fn sleep(&self, duration: Duration);
}

/// Sleeps on the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Retry policy with linear backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Delay unit; attempt N is followed by a wait of N units.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Policy from email configuration.
    #[must_use]
    pub fn from_config(config: &EmailConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.retry_base_delay_ms),
        }
    }

    /// Delay after the given failed attempt (1-indexed).
    #[must_use]
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay * attempt
    }

    /// Check if another attempt is allowed after `attempt` attempts.
    #[must_use]
    pub const fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}

/// Outcome for one recipient of a bulk send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecipientResult {
    /// Normalized recipient address
    pub email: String,
    /// `sent` or `failed`
    pub status: DeliveryStatus,
    /// Provider message ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    /// Ledger record, when it was written
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tracking_id: Option<String>,
}

/// Why one recipient failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecipientError {
    /// Normalized recipient address
    pub email: String,
    /// Error message
    pub error: String,
}

/// Result of a bulk send. A partly failed batch is not an error.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkSendReport {
    /// Recipients the provider accepted
    pub sent: usize,
    /// Recipients that failed
    pub failed: usize,
    /// One entry per recipient
    pub results: Vec<RecipientResult>,
    /// One entry per failed recipient
    pub errors: Vec<RecipientError>,
}

/// Email delivery engine.
#[derive(Clone)]
pub struct DeliveryEngine {
    transport: Arc<dyn EmailTransport>,
    sleeper: Arc<dyn Sleeper>,
    retry: RetryPolicy,
    tokens: VotingTokenService,
    ledger: TrackingLedger,
    reporter: StatsReporter,
    sender: Mailbox,
    reply_to: Option<String>,
}

impl DeliveryEngine {
    /// Create a new delivery engine.
    #[must_use]
    pub fn new(
        transport: Arc<dyn EmailTransport>,
        sleeper: Arc<dyn Sleeper>,
        tokens: VotingTokenService,
        ledger: TrackingLedger,
        reporter: StatsReporter,
        config: &EmailConfig,
    ) -> Self {
        Self {
            transport,
            sleeper,
            retry: RetryPolicy::from_config(config),
            tokens,
            ledger,
            reporter,
            sender: Mailbox::new(config.from_address.clone(), Some(config.from_name.clone())),
            reply_to: config.reply_to.clone(),
        }
    }

    /// Override the retry policy.
    #[must_use]
    pub const fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Send one message, retrying transport errors.
    pub async fn send(&self, message: &EmailMessage) -> AppResult<DeliveryReceipt> {
        self.send_with_retry(message).await.0
    }

    /// Returns the final result and the number of attempts made.
    async fn send_with_retry(&self, message: &EmailMessage) -> (AppResult<DeliveryReceipt>, u32) {
        let mut attempt = 1;
        loop {
            match self.transport.send(message).await {
                Ok(receipt) => return (Ok(receipt), attempt),
                Err(e) if self.retry.should_retry(attempt) => {
                    let delay = self.retry.delay_after(attempt);
                    tracing::warn!(
                        provider = self.transport.name(),
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Email send failed, retrying"
                    );
                    self.sleeper.sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return (Err(e), attempt),
            }
        }
    }

    /// Send one logical email to many recipients.
    ///
    /// Poll invitations get a freshly issued voting token per recipient,
    /// which `render` receives. Every recipient ends up with one ledger
    /// record, `sent` or `failed`; a failure never stops the batch.
    pub async fn send_bulk<F>(
        &self,
        email_type: EmailType,
        subject_id: &str,
        recipients: &[Mailbox],
        render: F,
    ) -> BulkSendReport
    where
        F: Fn(&Mailbox, Option<&str>) -> AppResult<RenderedEmail> + Send + Sync,
    {
        let mut report = BulkSendReport::default();
        let mut seen = HashSet::new();

        for recipient in recipients {
            let recipient = Mailbox::new(normalize_email(&recipient.email), recipient.name.clone());
            if !seen.insert(recipient.email.clone()) {
                tracing::debug!(subject_id = %subject_id, "Skipping duplicate recipient");
                continue;
            }

            let (outcome, attempts) = self
                .deliver_one(email_type, subject_id, &recipient, &render)
                .await;
            let retry_count = attempts.saturating_sub(1) as i32;

            let entry = NewTrackingEntry {
                email_type,
                subject_id: subject_id.to_string(),
                participant_email: recipient.email.clone(),
                status: if outcome.is_ok() {
                    DeliveryStatus::Sent
                } else {
                    DeliveryStatus::Failed
                },
                external_id: outcome.as_ref().ok().and_then(|r| r.message_id.clone()),
                error_message: outcome.as_ref().err().map(ToString::to_string),
                retry_count,
            };

            let tracking_id = match self.ledger.record(entry).await {
                Ok(record) => Some(record.id),
                Err(e) => {
                    // The email (if any) is already out; never re-send because of this.
                    tracing::warn!(
                        subject_id = %subject_id,
                        error = %e,
                        "Failed to record delivery in tracking ledger"
                    );
                    None
                }
            };

            match outcome {
                Ok(receipt) => {
                    tracing::info!(
                        email_type = %email_type,
                        subject_id = %subject_id,
                        attempts,
                        "Email sent"
                    );
                    report.sent += 1;
                    report.results.push(RecipientResult {
                        email: recipient.email,
                        status: DeliveryStatus::Sent,
                        external_id: receipt.message_id,
                        tracking_id,
                    });
                }
                Err(e) => {
                    tracing::warn!(
                        email_type = %email_type,
                        subject_id = %subject_id,
                        attempts,
                        error = %e,
                        "Email delivery failed"
                    );
                    report.failed += 1;
                    report.results.push(RecipientResult {
                        email: recipient.email.clone(),
                        status: DeliveryStatus::Failed,
                        external_id: None,
                        tracking_id,
                    });
                    report.errors.push(RecipientError {
                        email: recipient.email,
                        error: e.to_string(),
                    });
                }
            }
        }

        if let Err(e) = self.reporter.refresh(email_type, subject_id).await {
            tracing::warn!(subject_id = %subject_id, error = %e, "Failed to refresh aggregates");
        }

        report
    }

    async fn deliver_one<F>(
        &self,
        email_type: EmailType,
        subject_id: &str,
        recipient: &Mailbox,
        render: &F,
    ) -> (AppResult<DeliveryReceipt>, u32)
    where
        F: Fn(&Mailbox, Option<&str>) -> AppResult<RenderedEmail> + Send + Sync,
    {
        let token = match email_type {
            EmailType::PollInvitation => match self.tokens.issue(subject_id, &recipient.email).await
            {
                Ok(token) => Some(token),
                Err(e) => return (Err(e), 0),
            },
            EmailType::MediationNotice => None,
        };

        let rendered = match render(recipient, token.as_deref()) {
            Ok(rendered) => rendered,
            Err(e) => return (Err(e), 0),
        };
        if rendered.subject.trim().is_empty() {
            return (
                Err(AppError::Validation("Email subject is empty".to_string())),
                0,
            );
        }

        let mut headers = BTreeMap::new();
        headers.insert("X-Mediate-Type".to_string(), email_type.as_str().to_string());
        headers.insert("X-Mediate-Subject".to_string(), subject_id.to_string());

        let message = EmailMessage {
            from: self.sender.clone(),
            to: vec![recipient.clone()],
            reply_to: self.reply_to.clone(),
            subject: rendered.subject,
            text_body: rendered.text,
            html_body: Some(rendered.html),
            attachments: Vec::new(),
            headers,
        };

        self.send_with_retry(&message).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::services::test_support::Harness;

    fn rendered(subject: &str) -> RenderedEmail {
        RenderedEmail {
            subject: subject.to_string(),
            text: "text".to_string(),
            html: "<p>html</p>".to_string(),
        }
    }

    #[test]
    fn test_linear_backoff() {
        let policy = RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1000),
        };
        assert_eq!(policy.delay_after(1), Duration::from_millis(1000));
        assert_eq!(policy.delay_after(2), Duration::from_millis(2000));
        assert!(policy.should_retry(2));
        assert!(!policy.should_retry(3));
    }

    #[tokio::test]
    async fn test_send_retries_then_succeeds() {
        let harness = Harness::new();
        harness.transport.fail_next(2);

        let message = harness.message("alice@example.com");
        let receipt = harness.delivery.send(&message).await.unwrap();

        assert!(receipt.message_id.is_some());
        assert_eq!(harness.transport.calls(), 3);
        assert_eq!(
            harness.sleeper.delays(),
            vec![Duration::from_millis(1000), Duration::from_millis(2000)]
        );
    }

    #[tokio::test]
    async fn test_send_gives_up_after_max_attempts() {
        let harness = Harness::new();
        harness.transport.fail_next(10);

        let result = harness.delivery.send(&harness.message("alice@example.com")).await;

        assert!(matches!(result, Err(AppError::Transport(_))));
        assert_eq!(harness.transport.calls(), 3);
        assert_eq!(harness.sleeper.delays().len(), 2);
    }

    #[tokio::test]
    async fn test_bulk_send_isolates_failures() {
        let harness = Harness::new();
        harness.transport.always_fail_for("bob@example.com");

        let recipients = vec![
            Mailbox::new("alice@example.com", None),
            Mailbox::new("bob@example.com", None),
        ];
        let report = harness
            .delivery
            .send_bulk(EmailType::MediationNotice, "notice1", &recipients, |_, _| {
                Ok(rendered("Notice"))
            })
            .await;

        assert_eq!(report.sent, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].email, "bob@example.com");

        let records = harness.ledger.records("notice1").await.unwrap();
        let alice = records.iter().find(|r| r.participant_email == "alice@example.com").unwrap();
        let bob = records.iter().find(|r| r.participant_email == "bob@example.com").unwrap();
        assert_eq!(alice.status, DeliveryStatus::Sent);
        assert_eq!(bob.status, DeliveryStatus::Failed);
        assert!(!bob.error_message.as_deref().unwrap_or_default().is_empty());
        assert_eq!(bob.retry_count, 2);

        // Alice was sent exactly once.
        assert_eq!(harness.transport.sent_to("alice@example.com"), 1);
    }

    #[tokio::test]
    async fn test_bulk_send_render_failure_is_recorded() {
        let harness = Harness::new();
        let recipients = vec![
            Mailbox::new("alice@example.com", None),
            Mailbox::new("bob@example.com", None),
        ];

        let report = harness
            .delivery
            .send_bulk(EmailType::MediationNotice, "notice1", &recipients, |r, _| {
                if r.email == "alice@example.com" {
                    Err(AppError::Internal("template broke".to_string()))
                } else {
                    Ok(rendered("Notice"))
                }
            })
            .await;

        assert_eq!(report.sent, 1);
        assert_eq!(report.failed, 1);
        assert!(report.errors[0].error.contains("template broke"));
        assert_eq!(harness.transport.sent_to("alice@example.com"), 0);
    }

    #[tokio::test]
    async fn test_bulk_send_issues_tokens_for_invitations() {
        let harness = Harness::new();
        let recipients = vec![
            Mailbox::new(" Alice@Example.com ", None),
            Mailbox::new("alice@example.com", None),
        ];

        let tokens = std::sync::Mutex::new(Vec::new());
        let report = harness
            .delivery
            .send_bulk(EmailType::PollInvitation, "poll1", &recipients, |_, token| {
                tokens.lock().unwrap().push(token.map(String::from));
                Ok(rendered("Invitation"))
            })
            .await;

        // Duplicates after normalization are sent once.
        assert_eq!(report.sent, 1);
        let tokens = tokens.into_inner().unwrap();
        assert_eq!(tokens.len(), 1);
        let token = tokens[0].clone().unwrap();
        assert!(harness.tokens.validate("poll1", "alice@example.com", &token).await);

        let message = harness.transport.last_message().unwrap();
        assert_eq!(message.headers["X-Mediate-Type"], "poll_invitation");
        assert_eq!(message.to[0].email, "alice@example.com");
    }

    #[tokio::test]
    async fn test_resend_appends_new_record() {
        let harness = Harness::new();
        let recipients = vec![Mailbox::new("alice@example.com", None)];

        for _ in 0..2 {
            harness
                .delivery
                .send_bulk(EmailType::MediationNotice, "notice1", &recipients, |_, _| {
                    Ok(rendered("Notice"))
                })
                .await;
        }

        let mut sequences: Vec<_> = harness
            .ledger
            .records("notice1")
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.sequence)
            .collect();
        sequences.sort_unstable();
        assert_eq!(sequences, vec![1, 2]);
    }
}
