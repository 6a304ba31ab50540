//! Database repositories.
//!
//! sea-orm implementations of the traits in [`crate::store`].

mod email_tracking;
mod mediation_notice;
mod poll;
mod vote;
mod voting_token;

pub use email_tracking::EmailTrackingRepository;
pub use mediation_notice::MediationNoticeRepository;
pub use poll::PollRepository;
pub use vote::VoteRepository;
pub use voting_token::VotingTokenRepository;
