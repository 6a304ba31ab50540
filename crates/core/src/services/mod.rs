//! Business logic services.

pub mod delivery;
pub mod email;
pub mod identity;
pub mod notice;
pub mod poll;
pub mod render;
pub mod stats;
pub mod token;
pub mod tracking;
pub mod vote;

#[cfg(test)]
pub(crate) mod test_support;

pub use delivery::{
    BulkSendReport, DeliveryEngine, RecipientError, RecipientResult, RetryPolicy, Sleeper,
    TokioSleeper,
};
pub use email::{
    Attachment, BrevoTransport, DeliveryReceipt, EmailMessage, EmailTransport, LogTransport,
    MailgunTransport, Mailbox, SendGridTransport, SmtpTransport, build_transport,
};
pub use identity::{IdentityVerifier, JwtVerifier};
pub use notice::{CreateNoticeInput, NoticeService, UploadTicket};
pub use poll::{
    CreatePollInput, ParticipantInput, PollDetails, PollOptionInput, PollResults, PollService,
};
pub use render::RenderedEmail;
pub use stats::{EmailStats, StatsReporter, TypeStats};
pub use token::{DEFAULT_TOKEN_TTL_DAYS, VotingTokenService};
pub use tracking::{NewTrackingEntry, TrackingLedger};
pub use vote::{OptionScore, VOTE_FIELD_PREFIX, VoteReceipt, VoteService, VoteSubmission};
