//! Application state and middleware.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{Request, header},
    middleware::Next,
    response::Response,
};
use chrono::Duration;
use mediate_common::{BlobStore, Clock, Config};
use mediate_core::{
    DeliveryEngine, EmailTransport, IdentityVerifier, NoticeService, PollService, Sleeper,
    StatsReporter, TrackingLedger, VoteService, VotingTokenService,
};
use mediate_db::Stores;

use crate::extractors::AuthUser;

/// Everything the services need from the outside world.
#[derive(Clone)]
pub struct Collaborators {
    /// Persistence
    pub stores: Stores,
    /// Outgoing email
    pub transport: Arc<dyn EmailTransport>,
    /// Retry waits
    pub sleeper: Arc<dyn Sleeper>,
    /// Attachment storage
    pub blobs: Arc<dyn BlobStore>,
    /// Time source
    pub clock: Arc<dyn Clock>,
    /// Bearer credential verification
    pub verifier: Arc<dyn IdentityVerifier>,
}

/// Application state.
#[derive(Clone)]
pub struct AppState {
    /// Poll lifecycle
    pub poll_service: PollService,
    /// Vote submissions
    pub vote_service: VoteService,
    /// Mediation notices
    pub notice_service: NoticeService,
    /// Voting tokens
    pub token_service: VotingTokenService,
    /// Open/vote tracking
    pub tracking: TrackingLedger,
    /// Bearer credential verification
    pub verifier: Arc<dyn IdentityVerifier>,
    /// Redirect target after a recorded vote
    pub vote_confirmation_url: String,
}

impl AppState {
    /// Wire services from configuration and collaborators.
    #[must_use]
    pub fn new(config: &Config, deps: Collaborators) -> Self {
        let Collaborators {
            stores,
            transport,
            sleeper,
            blobs,
            clock,
            verifier,
        } = deps;

        let token_service = VotingTokenService::new(
            Arc::clone(&stores.tokens),
            Arc::clone(&clock),
            config.tracking.token_ttl_days,
        );
        let stats = StatsReporter::new(
            Arc::clone(&stores.tracking),
            Arc::clone(&stores.polls),
            Arc::clone(&stores.notices),
        );
        let tracking = TrackingLedger::new(
            Arc::clone(&stores.tracking),
            stats.clone(),
            Arc::clone(&clock),
        );
        let delivery = DeliveryEngine::new(
            transport,
            sleeper,
            token_service.clone(),
            tracking.clone(),
            stats,
            &config.email,
        );

        let vote_service = VoteService::new(
            Arc::clone(&stores.polls),
            Arc::clone(&stores.votes),
            token_service.clone(),
            tracking.clone(),
            Arc::clone(&clock),
        );
        let poll_service = PollService::new(
            Arc::clone(&stores.polls),
            Arc::clone(&stores.votes),
            tracking.clone(),
            delivery.clone(),
            Arc::clone(&clock),
            config.server.url.clone(),
        );
        let notice_service = NoticeService::new(
            Arc::clone(&stores.notices),
            tracking.clone(),
            delivery,
            blobs,
            clock,
            config.server.url.clone(),
            Duration::seconds(config.storage.url_ttl_secs),
        );

        Self {
            poll_service,
            vote_service,
            notice_service,
            token_service,
            tracking,
            verifier,
            vote_confirmation_url: config.vote_confirmation_url(),
        }
    }
}

/// Authentication middleware.
///
/// A valid bearer token attaches an [`AuthUser`]; anything else leaves the
/// request anonymous and lets the extractor reject it where required.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    if let Some(auth_header) = req.headers().get(header::AUTHORIZATION)
        && let Ok(auth_str) = auth_header.to_str()
        && let Some(token) = auth_str.strip_prefix("Bearer ")
    {
        match state.verifier.verify(token.trim()).await {
            Ok(subject) => {
                req.extensions_mut().insert(AuthUser(subject));
            }
            Err(e) => tracing::debug!(error = %e, "Bearer token rejected"),
        }
    }

    next.run(req).await
}
