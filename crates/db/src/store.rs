//! Storage traits consumed by the core services.
//!
//! Each trait is implemented by a sea-orm repository (see
//! [`crate::repositories`]) and by [`crate::memory::MemoryStore`]. Services
//! hold them as `Arc<dyn ...>` so they never reach for a global connection.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mediate_common::AppResult;

use crate::entities::{
    email_tracking::{self, EmailType},
    mediation_notice,
    poll::{self, PollStatus},
    poll_option, poll_participant, vote, voting_token,
};

/// Voting token persistence.
#[async_trait]
pub trait VotingTokenStore: Send + Sync {
    /// Insert or unconditionally overwrite the token stored under `token.key`.
    async fn upsert(&self, token: voting_token::Model) -> AppResult<()>;

    /// Look up a token by composite key.
    async fn find(&self, key: &str) -> AppResult<Option<voting_token::Model>>;
}

/// Email tracking ledger persistence.
#[async_trait]
pub trait TrackingStore: Send + Sync {
    /// Append a ledger record.
    ///
    /// Fails with `Conflict` if the key already has a record with the same
    /// sequence.
    async fn insert(&self, record: email_tracking::Model) -> AppResult<email_tracking::Model>;

    /// Most recent record (highest sequence) for a ledger key.
    ///
    /// Failed attempts are skipped unless `include_failed` is set.
    async fn find_latest(
        &self,
        email_type: EmailType,
        subject_id: &str,
        participant_email: &str,
        include_failed: bool,
    ) -> AppResult<Option<email_tracking::Model>>;

    /// Mark a record opened if it is not opened yet and did not fail.
    ///
    /// Returns whether this call changed the record.
    async fn mark_opened(&self, id: &str, at: DateTime<Utc>) -> AppResult<bool>;

    /// Set the voted-via-email flag if it is not set yet.
    ///
    /// Returns whether this call changed the record.
    async fn mark_voted(&self, id: &str, at: DateTime<Utc>) -> AppResult<bool>;

    /// All records for a poll or notice.
    async fn find_by_subject(&self, subject_id: &str) -> AppResult<Vec<email_tracking::Model>>;

    /// Remove all records for a poll or notice.
    async fn delete_by_subject(&self, subject_id: &str) -> AppResult<u64>;
}

/// Vote persistence.
#[async_trait]
pub trait VoteStore: Send + Sync {
    /// Atomically replace every vote of a participant in a poll.
    async fn replace_votes(
        &self,
        poll_id: &str,
        participant_email: &str,
        votes: Vec<vote::Model>,
    ) -> AppResult<()>;

    /// Votes of one participant.
    async fn find_by_participant(
        &self,
        poll_id: &str,
        participant_email: &str,
    ) -> AppResult<Vec<vote::Model>>;

    /// All votes in a poll.
    async fn find_by_poll(&self, poll_id: &str) -> AppResult<Vec<vote::Model>>;

    /// Remove all votes in a poll.
    async fn delete_by_poll(&self, poll_id: &str) -> AppResult<u64>;
}

/// A poll with its options and participants, as created in one unit.
#[derive(Debug, Clone)]
pub struct NewPoll {
    /// Poll row
    pub poll: poll::Model,
    /// Options in original order
    pub options: Vec<poll_option::Model>,
    /// Invited participants
    pub participants: Vec<poll_participant::Model>,
}

/// Poll persistence.
#[async_trait]
pub trait PollStore: Send + Sync {
    /// Create a poll together with its options and participants.
    async fn create(&self, new_poll: NewPoll) -> AppResult<poll::Model>;

    /// Find a poll by ID.
    async fn find_by_id(&self, id: &str) -> AppResult<Option<poll::Model>>;

    /// Options ordered by position.
    async fn find_options(&self, poll_id: &str) -> AppResult<Vec<poll_option::Model>>;

    /// Invited participants.
    async fn find_participants(&self, poll_id: &str)
    -> AppResult<Vec<poll_participant::Model>>;

    /// Change status (and the winning option when finalizing).
    async fn update_status(
        &self,
        id: &str,
        status: PollStatus,
        finalized_option_id: Option<String>,
        at: DateTime<Utc>,
    ) -> AppResult<poll::Model>;

    /// Write the ledger-derived counters.
    async fn update_aggregates(&self, id: &str, emails_sent: i32, emails_opened: i32)
    -> AppResult<()>;

    /// Delete a poll with its options and participants.
    async fn delete(&self, id: &str) -> AppResult<()>;
}

/// Mediation notice persistence.
#[async_trait]
pub trait NoticeStore: Send + Sync {
    /// Create a notice.
    async fn create(&self, notice: mediation_notice::Model) -> AppResult<mediation_notice::Model>;

    /// Find a notice by ID.
    async fn find_by_id(&self, id: &str) -> AppResult<Option<mediation_notice::Model>>;

    /// Record when the notice was (last) sent.
    async fn mark_sent(&self, id: &str, at: DateTime<Utc>) -> AppResult<()>;

    /// Write the ledger-derived counters.
    async fn update_aggregates(&self, id: &str, emails_sent: i32, emails_opened: i32)
    -> AppResult<()>;

    /// Delete a notice.
    async fn delete(&self, id: &str) -> AppResult<()>;
}

/// The full set of stores, as handed to service constructors.
#[derive(Clone)]
pub struct Stores {
    /// Voting tokens
    pub tokens: Arc<dyn VotingTokenStore>,
    /// Tracking ledger
    pub tracking: Arc<dyn TrackingStore>,
    /// Votes
    pub votes: Arc<dyn VoteStore>,
    /// Polls
    pub polls: Arc<dyn PollStore>,
    /// Notices
    pub notices: Arc<dyn NoticeStore>,
}

impl Stores {
    /// Stores backed by `PostgreSQL` repositories.
    #[must_use]
    pub fn postgres(db: Arc<sea_orm::DatabaseConnection>) -> Self {
        use crate::repositories::{
            EmailTrackingRepository, MediationNoticeRepository, PollRepository, VoteRepository,
            VotingTokenRepository,
        };

        Self {
            tokens: Arc::new(VotingTokenRepository::new(Arc::clone(&db))),
            tracking: Arc::new(EmailTrackingRepository::new(Arc::clone(&db))),
            votes: Arc::new(VoteRepository::new(Arc::clone(&db))),
            polls: Arc::new(PollRepository::new(Arc::clone(&db))),
            notices: Arc::new(MediationNoticeRepository::new(db)),
        }
    }

    /// Stores sharing one in-process [`crate::memory::MemoryStore`].
    #[must_use]
    pub fn in_memory(store: crate::memory::MemoryStore) -> Self {
        Self {
            tokens: Arc::new(store.clone()),
            tracking: Arc::new(store.clone()),
            votes: Arc::new(store.clone()),
            polls: Arc::new(store.clone()),
            notices: Arc::new(store),
        }
    }
}
