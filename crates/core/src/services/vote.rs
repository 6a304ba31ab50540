//! Vote reconciliation.
//!
//! Turns an emailed vote form into the participant's complete vote set for a
//! poll, and scores options for finalization.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use mediate_common::{AppError, AppResult, Clock, IdGenerator, normalize_email};
use mediate_db::{
    PollStore, VoteStore,
    entities::{
        poll::PollStatus,
        poll_option,
        vote::{self, VoteType},
    },
};
use serde::Serialize;

use super::token::VotingTokenService;
use super::tracking::TrackingLedger;

/// Form field prefix of a per-option answer.
pub const VOTE_FIELD_PREFIX: &str = "vote_";

/// An inbound vote submission.
#[derive(Debug, Clone)]
pub struct VoteSubmission {
    /// Poll voted on
    pub poll_id: String,
    /// Voter address as posted
    pub email: String,
    /// Voting token from the invitation
    pub token: String,
    /// Raw `(field, value)` pairs; only `vote_<optionId>` fields are used
    pub selections: Vec<(String, String)>,
    /// Where the vote came from
    pub source: String,
}

/// Result of an accepted submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteReceipt {
    /// Poll voted on
    pub poll_id: String,
    /// Normalized voter address
    pub email: String,
    /// Number of option answers stored
    pub accepted: usize,
}

/// Score of one option.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionScore {
    /// Option ID
    pub option_id: String,
    /// Original position
    pub position: i32,
    /// Yes answers
    pub yes: u32,
    /// If-need-be answers
    pub if_need_be: u32,
    /// No answers
    pub no: u32,
    /// `2 * yes + if_need_be`
    pub score: i64,
}

/// Keep the valid `vote_<optionId>` answers of a submitted form.
///
/// Unknown answers and unknown options are dropped one by one. When the same
/// option appears twice the last answer wins. The result follows option
/// position order.
#[must_use]
pub fn parse_selections(
    options: &[poll_option::Model],
    raw: &[(String, String)],
) -> Vec<(String, VoteType)> {
    let mut chosen: HashMap<&str, VoteType> = HashMap::new();

    for (field, value) in raw {
        let Some(option_id) = field.strip_prefix(VOTE_FIELD_PREFIX) else {
            continue;
        };
        let Some(vote_type) = VoteType::parse(value) else {
            tracing::debug!(field = %field, "Dropping unknown vote value");
            continue;
        };
        match options.iter().find(|o| o.id == option_id) {
            Some(option) => {
                chosen.insert(option.id.as_str(), vote_type);
            }
            None => tracing::debug!(field = %field, "Dropping vote for unknown option"),
        }
    }

    let mut ordered: Vec<_> = options.iter().collect();
    ordered.sort_by_key(|o| o.position);
    ordered
        .into_iter()
        .filter_map(|o| chosen.get(o.id.as_str()).map(|t| (o.id.clone(), *t)))
        .collect()
}

/// Score every option from a poll's votes, in position order.
#[must_use]
pub fn score_options(options: &[poll_option::Model], votes: &[vote::Model]) -> Vec<OptionScore> {
    let mut scores: BTreeMap<(i32, &str), OptionScore> = options
        .iter()
        .map(|o| {
            (
                (o.position, o.id.as_str()),
                OptionScore {
                    option_id: o.id.clone(),
                    position: o.position,
                    yes: 0,
                    if_need_be: 0,
                    no: 0,
                    score: 0,
                },
            )
        })
        .collect();

    for v in votes {
        let Some(score) = scores
            .values_mut()
            .find(|s| s.option_id == v.option_id)
        else {
            continue;
        };
        match v.vote_type {
            VoteType::Yes => score.yes += 1,
            VoteType::IfNeedBe => score.if_need_be += 1,
            VoteType::No => score.no += 1,
        }
        score.score += v.vote_type.weight();
    }

    scores.into_values().collect()
}

/// Highest score wins; ties go to the earliest position.
#[must_use]
pub fn select_winner(scores: &[OptionScore]) -> Option<&OptionScore> {
    scores.iter().fold(None, |best: Option<&OptionScore>, s| match best {
        Some(b) if b.score > s.score || (b.score == s.score && b.position <= s.position) => Some(b),
        _ => Some(s),
    })
}

/// Vote service for business logic.
#[derive(Clone)]
pub struct VoteService {
    polls: Arc<dyn PollStore>,
    votes: Arc<dyn VoteStore>,
    tokens: VotingTokenService,
    ledger: TrackingLedger,
    clock: Arc<dyn Clock>,
    id_gen: IdGenerator,
}

impl VoteService {
    /// Create a new vote service.
    #[must_use]
    pub fn new(
        polls: Arc<dyn PollStore>,
        votes: Arc<dyn VoteStore>,
        tokens: VotingTokenService,
        ledger: TrackingLedger,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            polls,
            votes,
            tokens,
            ledger,
            clock,
            id_gen: IdGenerator::new(),
        }
    }

    /// Accept a vote submission, replacing the participant's earlier votes.
    pub async fn submit_vote(&self, submission: VoteSubmission) -> AppResult<VoteReceipt> {
        let email = normalize_email(&submission.email);

        if !self
            .tokens
            .validate(&submission.poll_id, &email, &submission.token)
            .await
        {
            return Err(AppError::InvalidToken);
        }

        let poll = self
            .polls
            .find_by_id(&submission.poll_id)
            .await?
            .ok_or_else(|| AppError::PollNotFound(submission.poll_id.clone()))?;

        match poll.status {
            PollStatus::Active => {}
            PollStatus::Draft => return Err(AppError::PollState("not open yet".to_string())),
            PollStatus::Finalized => {
                return Err(AppError::PollState("already finalized".to_string()));
            }
        }

        let options = self.polls.find_options(&poll.id).await?;
        let selections = parse_selections(&options, &submission.selections);
        if selections.is_empty() {
            return Err(AppError::Validation(
                "Please choose an answer for at least one time option.".to_string(),
            ));
        }

        let now = self.clock.now();
        let source = if submission.source.trim().is_empty() {
            "email".to_string()
        } else {
            submission.source.trim().to_string()
        };
        let votes: Vec<_> = selections
            .into_iter()
            .map(|(option_id, vote_type)| vote::Model {
                id: self.id_gen.generate(),
                poll_id: poll.id.clone(),
                option_id,
                participant_email: email.clone(),
                vote_type,
                source: source.clone(),
                created_at: now.into(),
            })
            .collect();
        let accepted = votes.len();

        self.votes.replace_votes(&poll.id, &email, votes).await?;

        tracing::info!(poll_id = %poll.id, accepted, source = %source, "Votes recorded");

        if let Err(e) = self.ledger.mark_voted_via_email(&poll.id, &email).await {
            tracing::warn!(poll_id = %poll.id, error = %e, "Failed to mark invitation as voted");
        }

        Ok(VoteReceipt {
            poll_id: poll.id,
            email,
            accepted,
        })
    }

    /// Current votes of one participant.
    pub async fn participant_votes(&self, poll_id: &str, email: &str) -> AppResult<Vec<vote::Model>> {
        self.votes
            .find_by_participant(poll_id, &normalize_email(email))
            .await
    }
}
