//! Shared fixtures for service tests.

#![allow(clippy::unwrap_used)]

use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use mediate_common::{
    AppError, AppResult, Clock, IdGenerator, LocalBlobStore, ManualClock,
    config::{EmailConfig, EmailProviderConfig},
    storage::generate_storage_key,
};
use mediate_db::{
    MemoryStore, NewPoll, PollStore, Stores,
    entities::{
        poll::{self, PollStatus},
        poll_option, poll_participant,
    },
};

use super::delivery::{DeliveryEngine, Sleeper};
use super::email::{DeliveryReceipt, EmailMessage, EmailTransport, Mailbox};
use super::notice::NoticeService;
use super::poll::PollService;
use super::stats::StatsReporter;
use super::token::{DEFAULT_TOKEN_TTL_DAYS, VotingTokenService};
use super::tracking::TrackingLedger;
use super::vote::{VoteService, VoteSubmission};

pub const BASE_URL: &str = "https://mediate.example";

#[derive(Default)]
struct TransportState {
    calls: usize,
    fail_next: usize,
    always_fail: HashSet<String>,
    sent: Vec<EmailMessage>,
}

/// Transport that records accepted messages and fails on demand.
#[derive(Default)]
pub struct RecordingTransport {
    state: Mutex<TransportState>,
}

impl RecordingTransport {
    fn state(&self) -> std::sync::MutexGuard<'_, TransportState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Fail the next `n` sends.
    pub fn fail_next(&self, n: usize) {
        self.state().fail_next = n;
    }

    /// Fail every send to `email`.
    pub fn always_fail_for(&self, email: &str) {
        self.state().always_fail.insert(email.to_string());
    }

    /// Number of send attempts so far.
    pub fn calls(&self) -> usize {
        self.state().calls
    }

    /// Accepted messages addressed to `email`.
    pub fn sent_to(&self, email: &str) -> usize {
        self.state()
            .sent
            .iter()
            .filter(|m| m.to.iter().any(|to| to.email == email))
            .count()
    }

    pub fn last_message(&self) -> Option<EmailMessage> {
        self.state().sent.last().cloned()
    }

    /// Voting token embedded in the last accepted message.
    pub fn last_token(&self) -> Option<String> {
        let html = self.last_message()?.html_body?;
        let marker = r#"name="token" value=""#;
        let start = html.find(marker)? + marker.len();
        let end = html[start..].find('"')?;
        Some(html[start..start + end].to_string())
    }
}

#[async_trait]
impl EmailTransport for RecordingTransport {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn send(&self, message: &EmailMessage) -> AppResult<DeliveryReceipt> {
        let mut state = self.state();
        state.calls += 1;

        if state.fail_next > 0 {
            state.fail_next -= 1;
            return Err(AppError::Transport("connection reset".to_string()));
        }
        if message.to.iter().any(|to| state.always_fail.contains(&to.email)) {
            return Err(AppError::Transport("mailbox unavailable".to_string()));
        }

        state.sent.push(message.clone());
        Ok(DeliveryReceipt {
            message_id: Some(format!("msg-{}", state.calls)),
        })
    }
}

/// Sleeper that returns immediately and remembers what it was asked.
#[derive(Default)]
pub struct RecordingSleeper {
    delays: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn delays(&self) -> Vec<Duration> {
        self.delays.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.delays
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(duration);
    }
}

/// Every service wired to one in-memory store.
pub struct Harness {
    pub store: MemoryStore,
    pub clock: Arc<ManualClock>,
    pub transport: Arc<RecordingTransport>,
    pub sleeper: Arc<RecordingSleeper>,
    pub tokens: VotingTokenService,
    pub reporter: StatsReporter,
    pub ledger: TrackingLedger,
    pub delivery: DeliveryEngine,
    pub votes: VoteService,
    pub polls: PollService,
    pub notices: NoticeService,
    pub blob_dir: PathBuf,
}

impl Harness {
    pub fn new() -> Self {
        let store = MemoryStore::default();
        let stores = Stores::in_memory(store.clone());
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let transport = Arc::new(RecordingTransport::default());
        let sleeper = Arc::new(RecordingSleeper::default());
        let blob_dir =
            std::env::temp_dir().join(format!("mediate-test-{}", IdGenerator::new().generate()));

        let config = EmailConfig {
            provider: EmailProviderConfig::Log,
            from_address: "noreply@mediate.example".to_string(),
            from_name: "Mediate".to_string(),
            reply_to: None,
            retry_base_delay_ms: 1000,
            max_attempts: 3,
        };

        let tokens = VotingTokenService::new(
            Arc::clone(&stores.tokens),
            clock.clone(),
            DEFAULT_TOKEN_TTL_DAYS,
        );
        let reporter = StatsReporter::new(
            Arc::clone(&stores.tracking),
            Arc::clone(&stores.polls),
            Arc::clone(&stores.notices),
        );
        let ledger = TrackingLedger::new(
            Arc::clone(&stores.tracking),
            reporter.clone(),
            clock.clone(),
        );
        let delivery = DeliveryEngine::new(
            transport.clone(),
            sleeper.clone(),
            tokens.clone(),
            ledger.clone(),
            reporter.clone(),
            &config,
        );
        let votes = VoteService::new(
            Arc::clone(&stores.polls),
            Arc::clone(&stores.votes),
            tokens.clone(),
            ledger.clone(),
            clock.clone(),
        );
        let polls = PollService::new(
            Arc::clone(&stores.polls),
            Arc::clone(&stores.votes),
            ledger.clone(),
            delivery.clone(),
            clock.clone(),
            BASE_URL.to_string(),
        );
        let blobs = Arc::new(LocalBlobStore::new(
            blob_dir.clone(),
            format!("{BASE_URL}/files"),
            "blob-secret",
        ));
        let notices = NoticeService::new(
            Arc::clone(&stores.notices),
            ledger.clone(),
            delivery.clone(),
            blobs,
            clock.clone(),
            BASE_URL.to_string(),
            chrono::Duration::hours(1),
        );

        Self {
            store,
            clock,
            transport,
            sleeper,
            tokens,
            reporter,
            ledger,
            delivery,
            votes,
            polls,
            notices,
            blob_dir,
        }
    }

    /// A plain message to one recipient.
    pub fn message(&self, email: &str) -> EmailMessage {
        EmailMessage {
            from: Mailbox::new("noreply@mediate.example", None),
            to: vec![Mailbox::new(email, None)],
            reply_to: None,
            subject: "Hello".to_string(),
            text_body: "Hello".to_string(),
            html_body: None,
            attachments: Vec::new(),
            headers: BTreeMap::new(),
        }
    }

    /// An active poll created by `user1` with the given option IDs.
    pub async fn active_poll(&self, option_ids: &[&str], emails: &[&str]) -> poll::Model {
        self.poll_with_status(PollStatus::Active, option_ids, emails).await
    }

    /// A draft poll created by `user1` with the given option IDs.
    pub async fn draft_poll(&self, option_ids: &[&str], emails: &[&str]) -> poll::Model {
        self.poll_with_status(PollStatus::Draft, option_ids, emails).await
    }

    async fn poll_with_status(
        &self,
        status: PollStatus,
        option_ids: &[&str],
        emails: &[&str],
    ) -> poll::Model {
        let id_gen = IdGenerator::new();
        let poll_id = id_gen.generate();
        let now = self.clock.now();

        let options = option_ids
            .iter()
            .enumerate()
            .map(|(position, id)| poll_option::Model {
                id: (*id).to_string(),
                poll_id: poll_id.clone(),
                position: position as i32,
                starts_at: (now + chrono::Duration::days(position as i64 + 1)).into(),
                ends_at: None,
                label: None,
            })
            .collect();
        let participants = emails
            .iter()
            .map(|email| poll_participant::Model {
                id: id_gen.generate(),
                poll_id: poll_id.clone(),
                email: (*email).to_string(),
                name: None,
            })
            .collect();

        let poll = poll::Model {
            id: poll_id,
            creator_id: "user1".to_string(),
            case_id: None,
            title: "Scheduling".to_string(),
            description: None,
            organizer_name: "Dana".to_string(),
            status,
            finalized_option_id: None,
            emails_sent: 0,
            emails_opened: 0,
            created_at: now.into(),
            updated_at: None,
        };

        PollStore::create(
            &self.store,
            NewPoll {
                poll,
                options,
                participants,
            },
        )
        .await
        .unwrap()
    }

    /// A form submission as posted by the emailed vote form.
    pub fn submission(
        &self,
        poll_id: &str,
        email: &str,
        token: &str,
        answers: &[(&str, &str)],
    ) -> VoteSubmission {
        VoteSubmission {
            poll_id: poll_id.to_string(),
            email: email.to_string(),
            token: token.to_string(),
            selections: answers
                .iter()
                .map(|(field, value)| ((*field).to_string(), (*value).to_string()))
                .collect(),
            source: "email".to_string(),
        }
    }

    /// Store a document under a fresh key and return the key.
    pub async fn put_blob(&self, case_id: &str, name: &str) -> String {
        let key = generate_storage_key(case_id, name);
        let path = self.blob_dir.join(&key);
        tokio::fs::create_dir_all(path.parent().unwrap()).await.unwrap();
        tokio::fs::write(&path, b"%PDF-1.4").await.unwrap();
        key
    }
}
