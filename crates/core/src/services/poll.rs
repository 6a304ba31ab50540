//! Scheduling poll service.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use mediate_common::{AppError, AppResult, Clock, IdGenerator, normalize_email};
use mediate_db::{
    NewPoll, PollStore, VoteStore,
    entities::{
        email_tracking::EmailType,
        poll::{self, PollStatus},
        poll_option, poll_participant,
    },
};
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::delivery::{BulkSendReport, DeliveryEngine};
use super::email::Mailbox;
use super::render::{self, PollInvitation};
use super::tracking::TrackingLedger;
use super::vote::{OptionScore, score_options, select_winner};

/// Maximum number of time options per poll.
const MAX_OPTIONS: usize = 50;

/// Maximum number of participants per poll.
const MAX_PARTICIPANTS: usize = 500;

/// Input for one proposed time.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct PollOptionInput {
    /// Start of the slot
    pub starts_at: DateTime<Utc>,
    /// End of the slot
    #[serde(default)]
    pub ends_at: Option<DateTime<Utc>>,
    /// Free-form label
    #[serde(default)]
    #[validate(length(max = 200))]
    pub label: Option<String>,
}

/// Input for one invited participant.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantInput {
    /// Email address
    #[validate(email)]
    pub email: String,
    /// Display name
    #[serde(default)]
    #[validate(length(max = 200))]
    pub name: Option<String>,
}

/// Input for creating a poll.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreatePollInput {
    /// Poll title
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    /// Longer description shown in the invitation
    #[serde(default)]
    #[validate(length(max = 5000))]
    pub description: Option<String>,
    /// Case the poll belongs to
    #[serde(default)]
    pub case_id: Option<String>,
    /// Sender name shown in invitations
    #[validate(length(min = 1, max = 100))]
    pub organizer_name: String,
    /// Proposed times, in display order
    #[validate(nested)]
    pub options: Vec<PollOptionInput>,
    /// Invited participants
    #[serde(default)]
    #[validate(nested)]
    pub participants: Vec<ParticipantInput>,
}

/// A poll with its options and participants.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PollDetails {
    /// Poll row
    pub poll: poll::Model,
    /// Options in position order
    pub options: Vec<poll_option::Model>,
    /// Invited participants
    pub participants: Vec<poll_participant::Model>,
}

/// Current standing of a poll.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PollResults {
    /// Poll ID
    pub poll_id: String,
    /// Lifecycle status
    pub status: PollStatus,
    /// Option chosen at finalization
    pub finalized_option_id: Option<String>,
    /// Per-option counts and scores, in position order
    pub options: Vec<OptionScore>,
    /// Option that would win right now
    pub leading_option_id: Option<String>,
    /// Participants who have voted
    pub voters: usize,
    /// Invited participants
    pub participants: usize,
}

/// Poll service for business logic.
#[derive(Clone)]
pub struct PollService {
    polls: Arc<dyn PollStore>,
    votes: Arc<dyn VoteStore>,
    ledger: TrackingLedger,
    delivery: DeliveryEngine,
    clock: Arc<dyn Clock>,
    base_url: String,
    id_gen: IdGenerator,
}

impl PollService {
    /// Create a new poll service.
    #[must_use]
    pub fn new(
        polls: Arc<dyn PollStore>,
        votes: Arc<dyn VoteStore>,
        ledger: TrackingLedger,
        delivery: DeliveryEngine,
        clock: Arc<dyn Clock>,
        base_url: String,
    ) -> Self {
        Self {
            polls,
            votes,
            ledger,
            delivery,
            clock,
            base_url,
            id_gen: IdGenerator::new(),
        }
    }

    /// Create a draft poll.
    pub async fn create(&self, creator_id: &str, mut input: CreatePollInput) -> AppResult<PollDetails> {
        for participant in &mut input.participants {
            participant.email = normalize_email(&participant.email);
        }
        input.validate()?;

        if input.options.is_empty() {
            return Err(AppError::Validation(
                "Poll must have at least one time option".to_string(),
            ));
        }
        if input.options.len() > MAX_OPTIONS {
            return Err(AppError::Validation(format!(
                "Poll cannot have more than {MAX_OPTIONS} time options"
            )));
        }
        if input.participants.len() > MAX_PARTICIPANTS {
            return Err(AppError::Validation(format!(
                "Poll cannot have more than {MAX_PARTICIPANTS} participants"
            )));
        }
        if input
            .options
            .iter()
            .any(|o| o.ends_at.is_some_and(|ends| ends <= o.starts_at))
        {
            return Err(AppError::Validation(
                "A time option must end after it starts".to_string(),
            ));
        }

        let poll_id = self.id_gen.generate();
        let now = self.clock.now();

        let options = input
            .options
            .into_iter()
            .enumerate()
            .map(|(position, o)| poll_option::Model {
                id: self.id_gen.generate(),
                poll_id: poll_id.clone(),
                position: position as i32,
                starts_at: o.starts_at.into(),
                ends_at: o.ends_at.map(Into::into),
                label: o.label.filter(|l| !l.trim().is_empty()),
            })
            .collect();

        let mut seen = HashSet::new();
        let participants = input
            .participants
            .into_iter()
            .filter(|p| seen.insert(p.email.clone()))
            .map(|p| poll_participant::Model {
                id: self.id_gen.generate(),
                poll_id: poll_id.clone(),
                email: p.email,
                name: p.name.filter(|n| !n.trim().is_empty()),
            })
            .collect();

        let poll = poll::Model {
            id: poll_id.clone(),
            creator_id: creator_id.to_string(),
            case_id: input.case_id,
            title: input.title.trim().to_string(),
            description: input.description.filter(|d| !d.trim().is_empty()),
            organizer_name: input.organizer_name.trim().to_string(),
            status: PollStatus::Draft,
            finalized_option_id: None,
            emails_sent: 0,
            emails_opened: 0,
            created_at: now.into(),
            updated_at: None,
        };

        self.polls
            .create(NewPoll {
                poll,
                options,
                participants,
            })
            .await?;

        tracing::info!(poll_id = %poll_id, creator_id = %creator_id, "Poll created");
        self.details(&poll_id).await
    }

    /// Get a poll owned by `actor_id`.
    pub async fn get(&self, actor_id: &str, poll_id: &str) -> AppResult<PollDetails> {
        self.load_owned(actor_id, poll_id).await?;
        self.details(poll_id).await
    }

    /// Open a draft poll for voting.
    pub async fn activate(&self, actor_id: &str, poll_id: &str) -> AppResult<poll::Model> {
        let poll = self.load_owned(actor_id, poll_id).await?;
        match poll.status {
            PollStatus::Active => Ok(poll),
            PollStatus::Finalized => Err(AppError::PollState("already finalized".to_string())),
            PollStatus::Draft => {
                let poll = self
                    .polls
                    .update_status(poll_id, PollStatus::Active, None, self.clock.now())
                    .await?;
                tracing::info!(poll_id = %poll_id, "Poll activated");
                Ok(poll)
            }
        }
    }

    /// Email every participant a fresh invitation. Activates a draft poll.
    pub async fn send_invitations(
        &self,
        actor_id: &str,
        poll_id: &str,
    ) -> AppResult<BulkSendReport> {
        self.invite(actor_id, poll_id, None).await
    }

    /// Re-send invitations to some participants. Earlier links stop working.
    pub async fn send_invitations_to(
        &self,
        actor_id: &str,
        poll_id: &str,
        emails: &[String],
    ) -> AppResult<BulkSendReport> {
        let wanted: HashSet<String> = emails.iter().map(|e| normalize_email(e)).collect();
        self.invite(actor_id, poll_id, Some(wanted)).await
    }

    async fn invite(
        &self,
        actor_id: &str,
        poll_id: &str,
        only: Option<HashSet<String>>,
    ) -> AppResult<BulkSendReport> {
        let poll = self.load_owned(actor_id, poll_id).await?;
        if poll.status == PollStatus::Finalized {
            return Err(AppError::PollState("already finalized".to_string()));
        }
        let options = self.polls.find_options(poll_id).await?;

        let participants = self.polls.find_participants(poll_id).await?;
        if let Some(only) = &only
            && let Some(unknown) = only.iter().find(|e| !participants.iter().any(|p| &p.email == *e))
        {
            return Err(AppError::Validation(format!(
                "{unknown} is not a participant of this poll"
            )));
        }

        let recipients: Vec<Mailbox> = participants
            .into_iter()
            .filter(|p| only.as_ref().is_none_or(|only| only.contains(&p.email)))
            .map(|p| Mailbox::new(p.email, p.name))
            .collect();
        if recipients.is_empty() {
            return Err(AppError::Validation("Poll has no participants to invite".to_string()));
        }

        // Recipients are settled; only now may the poll leave draft.
        let poll = self.activate(actor_id, poll_id).await?;

        let base_url = self.base_url.as_str();
        let report = self
            .delivery
            .send_bulk(
                EmailType::PollInvitation,
                poll_id,
                &recipients,
                |recipient, token| {
                    let token = token.ok_or_else(|| {
                        AppError::Internal("No voting token issued".to_string())
                    })?;
                    Ok(render::poll_invitation(&PollInvitation {
                        poll: &poll,
                        options: &options,
                        recipient,
                        token,
                        base_url,
                    }))
                },
            )
            .await;

        tracing::info!(
            poll_id = %poll_id,
            sent = report.sent,
            failed = report.failed,
            "Poll invitations sent"
        );
        Ok(report)
    }

    /// Close the poll on `option_id`, or on the best-scoring option.
    pub async fn finalize(
        &self,
        actor_id: &str,
        poll_id: &str,
        option_id: Option<String>,
    ) -> AppResult<PollResults> {
        let poll = self.load_owned(actor_id, poll_id).await?;
        match poll.status {
            PollStatus::Active => {}
            PollStatus::Draft => return Err(AppError::PollState("not open yet".to_string())),
            PollStatus::Finalized => {
                return Err(AppError::PollState("already finalized".to_string()));
            }
        }

        let options = self.polls.find_options(poll_id).await?;
        let votes = self.votes.find_by_poll(poll_id).await?;
        let scores = score_options(&options, &votes);

        let chosen = match option_id {
            Some(id) if options.iter().any(|o| o.id == id) => id,
            Some(id) => {
                return Err(AppError::Validation(format!(
                    "{id} is not an option of this poll"
                )));
            }
            None => select_winner(&scores)
                .map(|s| s.option_id.clone())
                .ok_or_else(|| AppError::Validation("Poll has no options".to_string()))?,
        };

        self.polls
            .update_status(poll_id, PollStatus::Finalized, Some(chosen.clone()), self.clock.now())
            .await?;
        tracing::info!(poll_id = %poll_id, option_id = %chosen, "Poll finalized");

        self.results(actor_id, poll_id).await
    }

    /// Per-option counts and scores.
    pub async fn results(&self, actor_id: &str, poll_id: &str) -> AppResult<PollResults> {
        let poll = self.load_owned(actor_id, poll_id).await?;
        let options = self.polls.find_options(poll_id).await?;
        let participants = self.polls.find_participants(poll_id).await?;
        let votes = self.votes.find_by_poll(poll_id).await?;

        let scores = score_options(&options, &votes);
        let leading_option_id = select_winner(&scores).map(|s| s.option_id.clone());
        let voters = votes
            .iter()
            .map(|v| v.participant_email.as_str())
            .collect::<HashSet<_>>()
            .len();

        Ok(PollResults {
            poll_id: poll.id,
            status: poll.status,
            finalized_option_id: poll.finalized_option_id,
            options: scores,
            leading_option_id,
            voters,
            participants: participants.len(),
        })
    }

    /// Delete a poll with its votes and tracking records.
    pub async fn delete(&self, actor_id: &str, poll_id: &str) -> AppResult<()> {
        self.load_owned(actor_id, poll_id).await?;

        let votes = self.votes.delete_by_poll(poll_id).await?;
        let records = self.ledger.purge(poll_id).await?;
        self.polls.delete(poll_id).await?;

        tracing::info!(poll_id = %poll_id, votes, records, "Poll deleted");
        Ok(())
    }

    async fn load_owned(&self, actor_id: &str, poll_id: &str) -> AppResult<poll::Model> {
        let poll = self
            .polls
            .find_by_id(poll_id)
            .await?
            .ok_or_else(|| AppError::PollNotFound(poll_id.to_string()))?;
        if poll.creator_id != actor_id {
            return Err(AppError::Forbidden(
                "Only the poll creator can manage this poll".to_string(),
            ));
        }
        Ok(poll)
    }

    async fn details(&self, poll_id: &str) -> AppResult<PollDetails> {
        let poll = self
            .polls
            .find_by_id(poll_id)
            .await?
            .ok_or_else(|| AppError::PollNotFound(poll_id.to_string()))?;
        Ok(PollDetails {
            options: self.polls.find_options(poll_id).await?,
            participants: self.polls.find_participants(poll_id).await?,
            poll,
        })
    }
}
