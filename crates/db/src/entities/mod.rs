//! Database entities.

pub mod email_tracking;
pub mod mediation_notice;
pub mod poll;
pub mod poll_option;
pub mod poll_participant;
pub mod vote;
pub mod voting_token;

pub use email_tracking::Entity as EmailTracking;
pub use mediation_notice::Entity as MediationNotice;
pub use poll::Entity as Poll;
pub use poll_option::Entity as PollOption;
pub use poll_participant::Entity as PollParticipant;
pub use vote::Entity as Vote;
pub use voting_token::Entity as VotingToken;
