//! In-process store.
//!
//! Implements every trait in [`crate::store`] over plain collections behind
//! one lock. Used by tests and by `database.in_memory` deployments.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mediate_common::{AppError, AppResult};
use tokio::sync::RwLock;

use crate::entities::{
    email_tracking::{self, DeliveryStatus, EmailType},
    mediation_notice,
    poll::{self, PollStatus},
    poll_option, poll_participant, vote, voting_token,
};
use crate::store::{
    NewPoll, NoticeStore, PollStore, TrackingStore, VoteStore, VotingTokenStore,
};

#[derive(Debug, Default)]
struct Tables {
    tokens: HashMap<String, voting_token::Model>,
    tracking: Vec<email_tracking::Model>,
    votes: Vec<vote::Model>,
    polls: HashMap<String, poll::Model>,
    options: Vec<poll_option::Model>,
    participants: Vec<poll_participant::Model>,
    notices: HashMap<String, mediation_notice::Model>,
}

/// Shared in-memory tables. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VotingTokenStore for MemoryStore {
    async fn upsert(&self, token: voting_token::Model) -> AppResult<()> {
        self.tables.write().await.tokens.insert(token.key.clone(), token);
        Ok(())
    }

    async fn find(&self, key: &str) -> AppResult<Option<voting_token::Model>> {
        Ok(self.tables.read().await.tokens.get(key).cloned())
    }
}

#[async_trait]
impl TrackingStore for MemoryStore {
    async fn insert(&self, record: email_tracking::Model) -> AppResult<email_tracking::Model> {
        let mut tables = self.tables.write().await;
        if tables.tracking.iter().any(|r| r.id == record.id) {
            return Err(AppError::Database(format!(
                "duplicate tracking id: {}",
                record.id
            )));
        }
        if tables.tracking.iter().any(|r| {
            r.email_type == record.email_type
                && r.subject_id == record.subject_id
                && r.participant_email == record.participant_email
                && r.sequence == record.sequence
        }) {
            return Err(AppError::Conflict(format!(
                "tracking sequence {} already taken",
                record.sequence
            )));
        }
        tables.tracking.push(record.clone());
        Ok(record)
    }

    async fn find_latest(
        &self,
        email_type: EmailType,
        subject_id: &str,
        participant_email: &str,
        include_failed: bool,
    ) -> AppResult<Option<email_tracking::Model>> {
        Ok(self
            .tables
            .read()
            .await
            .tracking
            .iter()
            .filter(|r| {
                r.email_type == email_type
                    && r.subject_id == subject_id
                    && r.participant_email == participant_email
                    && (include_failed || r.status != DeliveryStatus::Failed)
            })
            .max_by(|a, b| a.sequence.cmp(&b.sequence).then_with(|| a.id.cmp(&b.id)))
            .cloned())
    }

    async fn mark_opened(&self, id: &str, at: DateTime<Utc>) -> AppResult<bool> {
        let mut tables = self.tables.write().await;
        let Some(record) = tables.tracking.iter_mut().find(|r| r.id == id) else {
            return Ok(false);
        };
        if record.opened || record.status == DeliveryStatus::Failed {
            return Ok(false);
        }
        record.opened = true;
        record.opened_at = Some(at.into());
        record.status = DeliveryStatus::Opened;
        record.updated_at = at.into();
        Ok(true)
    }

    async fn mark_voted(&self, id: &str, at: DateTime<Utc>) -> AppResult<bool> {
        let mut tables = self.tables.write().await;
        let Some(record) = tables.tracking.iter_mut().find(|r| r.id == id) else {
            return Ok(false);
        };
        if record.voted_via_email {
            return Ok(false);
        }
        record.voted_via_email = true;
        record.voted_via_email_at = Some(at.into());
        record.updated_at = at.into();
        Ok(true)
    }

    async fn find_by_subject(&self, subject_id: &str) -> AppResult<Vec<email_tracking::Model>> {
        let mut records: Vec<_> = self
            .tables
            .read()
            .await
            .tracking
            .iter()
            .filter(|r| r.subject_id == subject_id)
            .cloned()
            .collect();
        records.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(records)
    }

    async fn delete_by_subject(&self, subject_id: &str) -> AppResult<u64> {
        let mut tables = self.tables.write().await;
        let before = tables.tracking.len();
        tables.tracking.retain(|r| r.subject_id != subject_id);
        Ok((before - tables.tracking.len()) as u64)
    }
}

#[async_trait]
impl VoteStore for MemoryStore {
    async fn replace_votes(
        &self,
        poll_id: &str,
        participant_email: &str,
        votes: Vec<vote::Model>,
    ) -> AppResult<()> {
        // Delete and insert under one write guard, so readers never see a partial set.
        let mut tables = self.tables.write().await;
        tables
            .votes
            .retain(|v| !(v.poll_id == poll_id && v.participant_email == participant_email));
        tables.votes.extend(votes);
        Ok(())
    }

    async fn find_by_participant(
        &self,
        poll_id: &str,
        participant_email: &str,
    ) -> AppResult<Vec<vote::Model>> {
        Ok(self
            .tables
            .read()
            .await
            .votes
            .iter()
            .filter(|v| v.poll_id == poll_id && v.participant_email == participant_email)
            .cloned()
            .collect())
    }

    async fn find_by_poll(&self, poll_id: &str) -> AppResult<Vec<vote::Model>> {
        Ok(self
            .tables
            .read()
            .await
            .votes
            .iter()
            .filter(|v| v.poll_id == poll_id)
            .cloned()
            .collect())
    }

    async fn delete_by_poll(&self, poll_id: &str) -> AppResult<u64> {
        let mut tables = self.tables.write().await;
        let before = tables.votes.len();
        tables.votes.retain(|v| v.poll_id != poll_id);
        Ok((before - tables.votes.len()) as u64)
    }
}

#[async_trait]
impl PollStore for MemoryStore {
    async fn create(&self, new_poll: NewPoll) -> AppResult<poll::Model> {
        let mut tables = self.tables.write().await;
        if tables.polls.contains_key(&new_poll.poll.id) {
            return Err(AppError::Database(format!(
                "duplicate poll id: {}",
                new_poll.poll.id
            )));
        }
        let created = new_poll.poll.clone();
        tables.polls.insert(created.id.clone(), new_poll.poll);
        tables.options.extend(new_poll.options);
        tables.participants.extend(new_poll.participants);
        Ok(created)
    }

    async fn find_by_id(&self, id: &str) -> AppResult<Option<poll::Model>> {
        Ok(self.tables.read().await.polls.get(id).cloned())
    }

    async fn find_options(&self, poll_id: &str) -> AppResult<Vec<poll_option::Model>> {
        let mut options: Vec<_> = self
            .tables
            .read()
            .await
            .options
            .iter()
            .filter(|o| o.poll_id == poll_id)
            .cloned()
            .collect();
        options.sort_by_key(|o| o.position);
        Ok(options)
    }

    async fn find_participants(
        &self,
        poll_id: &str,
    ) -> AppResult<Vec<poll_participant::Model>> {
        let mut participants: Vec<_> = self
            .tables
            .read()
            .await
            .participants
            .iter()
            .filter(|p| p.poll_id == poll_id)
            .cloned()
            .collect();
        participants.sort_by(|a, b| a.email.cmp(&b.email));
        Ok(participants)
    }

    async fn update_status(
        &self,
        id: &str,
        status: PollStatus,
        finalized_option_id: Option<String>,
        at: DateTime<Utc>,
    ) -> AppResult<poll::Model> {
        let mut tables = self.tables.write().await;
        let poll = tables
            .polls
            .get_mut(id)
            .ok_or_else(|| AppError::PollNotFound(id.to_string()))?;
        poll.status = status;
        poll.finalized_option_id = finalized_option_id;
        poll.updated_at = Some(at.into());
        Ok(poll.clone())
    }

    async fn update_aggregates(
        &self,
        id: &str,
        emails_sent: i32,
        emails_opened: i32,
    ) -> AppResult<()> {
        if let Some(poll) = self.tables.write().await.polls.get_mut(id) {
            poll.emails_sent = emails_sent;
            poll.emails_opened = emails_opened;
        }
        Ok(())
    }

    async fn delete(&self, id: &str) -> AppResult<()> {
        let mut tables = self.tables.write().await;
        tables.polls.remove(id);
        tables.options.retain(|o| o.poll_id != id);
        tables.participants.retain(|p| p.poll_id != id);
        tables.votes.retain(|v| v.poll_id != id);
        Ok(())
    }
}

#[async_trait]
impl NoticeStore for MemoryStore {
    async fn create(
        &self,
        notice: mediation_notice::Model,
    ) -> AppResult<mediation_notice::Model> {
        let mut tables = self.tables.write().await;
        if tables.notices.contains_key(&notice.id) {
            return Err(AppError::Database(format!(
                "duplicate notice id: {}",
                notice.id
            )));
        }
        tables.notices.insert(notice.id.clone(), notice.clone());
        Ok(notice)
    }

    async fn find_by_id(&self, id: &str) -> AppResult<Option<mediation_notice::Model>> {
        Ok(self.tables.read().await.notices.get(id).cloned())
    }

    async fn mark_sent(&self, id: &str, at: DateTime<Utc>) -> AppResult<()> {
        if let Some(notice) = self.tables.write().await.notices.get_mut(id) {
            notice.sent_at = Some(at.into());
        }
        Ok(())
    }

    async fn update_aggregates(
        &self,
        id: &str,
        emails_sent: i32,
        emails_opened: i32,
    ) -> AppResult<()> {
        if let Some(notice) = self.tables.write().await.notices.get_mut(id) {
            notice.emails_sent = emails_sent;
            notice.emails_opened = emails_opened;
        }
        Ok(())
    }

    async fn delete(&self, id: &str) -> AppResult<()> {
        self.tables.write().await.notices.remove(id);
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn record(id: &str, sequence: i32, status: DeliveryStatus) -> email_tracking::Model {
        let now = Utc::now().into();
        email_tracking::Model {
            id: id.to_string(),
            email_type: EmailType::PollInvitation,
            subject_id: "poll1".to_string(),
            participant_email: "alice@example.com".to_string(),
            sequence,
            status,
            opened: false,
            opened_at: None,
            voted_via_email: false,
            voted_via_email_at: None,
            external_id: None,
            error_message: None,
            retry_count: 0,
            created_at: now,
            updated_at: now,
        }
    }

    fn vote(id: &str, email: &str, option_id: &str) -> vote::Model {
        vote::Model {
            id: id.to_string(),
            poll_id: "poll1".to_string(),
            option_id: option_id.to_string(),
            participant_email: email.to_string(),
            vote_type: vote::VoteType::Yes,
            source: "email".to_string(),
            created_at: Utc::now().into(),
        }
    }

    #[tokio::test]
    async fn test_find_latest_skips_failed() {
        let store = MemoryStore::new();
        store.insert(record("a", 1, DeliveryStatus::Sent)).await.unwrap();
        store.insert(record("b", 2, DeliveryStatus::Failed)).await.unwrap();

        let latest = store
            .find_latest(EmailType::PollInvitation, "poll1", "alice@example.com", false)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(latest.id, "a");

        let latest = store
            .find_latest(EmailType::PollInvitation, "poll1", "alice@example.com", true)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(latest.id, "b");
    }

    #[tokio::test]
    async fn test_insert_rejects_taken_sequence() {
        let store = MemoryStore::new();
        store.insert(record("a", 1, DeliveryStatus::Sent)).await.unwrap();

        let result = store.insert(record("b", 1, DeliveryStatus::Sent)).await;
        assert!(matches!(result, Err(AppError::Conflict(_))));
        store.insert(record("b", 2, DeliveryStatus::Sent)).await.unwrap();
    }

    #[tokio::test]
    async fn test_mark_opened_once() {
        let store = MemoryStore::new();
        store.insert(record("a", 1, DeliveryStatus::Sent)).await.unwrap();
        store.insert(record("f", 2, DeliveryStatus::Failed)).await.unwrap();

        assert!(store.mark_opened("a", Utc::now()).await.unwrap());
        assert!(!store.mark_opened("a", Utc::now()).await.unwrap());
        assert!(!store.mark_opened("f", Utc::now()).await.unwrap());
        assert!(!store.mark_opened("missing", Utc::now()).await.unwrap());
    }

    #[tokio::test]
    async fn test_replace_votes_only_touches_one_participant() {
        let store = MemoryStore::new();
        store
            .replace_votes("poll1", "alice@example.com", vec![vote("1", "alice@example.com", "o1")])
            .await
            .unwrap();
        store
            .replace_votes("poll1", "bob@example.com", vec![vote("2", "bob@example.com", "o1")])
            .await
            .unwrap();
        store
            .replace_votes("poll1", "alice@example.com", vec![vote("3", "alice@example.com", "o2")])
            .await
            .unwrap();

        let all = store.find_by_poll("poll1").await.unwrap();
        assert_eq!(all.len(), 2);
        let alice = store
            .find_by_participant("poll1", "alice@example.com")
            .await
            .unwrap();
        assert_eq!(alice.len(), 1);
        assert_eq!(alice[0].option_id, "o2");
    }

    #[tokio::test]
    async fn test_clones_share_state() {
        let store = MemoryStore::new();
        let other = store.clone();
        store.insert(record("a", 1, DeliveryStatus::Sent)).await.unwrap();
        assert_eq!(other.find_by_subject("poll1").await.unwrap().len(), 1);
    }
}
