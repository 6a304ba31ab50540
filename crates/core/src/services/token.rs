//! Voting token service.
//!
//! Voting links in invitation emails are unauthenticated, so each
//! (poll, participant) pair gets an opaque random token. Re-issuing replaces
//! the stored token, which invalidates every link sent earlier.

use std::sync::Arc;

use chrono::Duration;
use mediate_common::{AppResult, Clock, IdGenerator, normalize_email};
use mediate_db::{VotingTokenStore, entities::voting_token};
use sha2::{Digest, Sha256};

/// Default token lifetime.
pub const DEFAULT_TOKEN_TTL_DAYS: i64 = 30;

/// Storage key for a (poll, participant) pair.
///
/// The address is normalized and hashed, so the key never contains `:` from
/// user input and two distinct addresses cannot collide.
#[must_use]
pub fn token_key(poll_id: &str, email: &str) -> String {
    let digest = Sha256::digest(normalize_email(email).as_bytes());
    format!("{poll_id}:{}", hex::encode(digest))
}

/// Issues and validates voting tokens.
#[derive(Clone)]
pub struct VotingTokenService {
    store: Arc<dyn VotingTokenStore>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    id_gen: IdGenerator,
}

impl VotingTokenService {
    /// Create a new voting token service.
    #[must_use]
    pub fn new(store: Arc<dyn VotingTokenStore>, clock: Arc<dyn Clock>, ttl_days: i64) -> Self {
        Self {
            store,
            clock,
            ttl: Duration::days(ttl_days),
            id_gen: IdGenerator::new(),
        }
    }

    /// Issue a fresh token, overwriting any token already stored for the pair.
    pub async fn issue(&self, poll_id: &str, email: &str) -> AppResult<String> {
        let token = self.id_gen.generate_token();
        let now = self.clock.now();

        self.store
            .upsert(voting_token::Model {
                key: token_key(poll_id, email),
                poll_id: poll_id.to_string(),
                participant_email: normalize_email(email),
                token: token.clone(),
                created_at: now.into(),
                expires_at: (now + self.ttl).into(),
            })
            .await?;

        tracing::debug!(poll_id = %poll_id, "Issued voting token");
        Ok(token)
    }

    /// Check a presented token. Any doubt, including a storage failure, is a no.
    pub async fn validate(&self, poll_id: &str, email: &str, token: &str) -> bool {
        if poll_id.is_empty() || email.trim().is_empty() || token.is_empty() {
            return false;
        }

        let stored = match self.store.find(&token_key(poll_id, email)).await {
            Ok(Some(stored)) => stored,
            Ok(None) => return false,
            Err(e) => {
                tracing::warn!(poll_id = %poll_id, error = %e, "Token lookup failed");
                return false;
            }
        };

        let now = self.clock.now();
        stored.token == token && stored.created_at <= now && now < stored.expires_at
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use mediate_common::{AppError, ManualClock};
    use mediate_db::MemoryStore;

    struct BrokenStore;

    #[async_trait]
    impl VotingTokenStore for BrokenStore {
        async fn upsert(&self, _token: voting_token::Model) -> AppResult<()> {
            Err(AppError::Database("down".to_string()))
        }

        async fn find(&self, _key: &str) -> AppResult<Option<voting_token::Model>> {
            Err(AppError::Database("down".to_string()))
        }
    }

    fn service() -> (VotingTokenService, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let service = VotingTokenService::new(
            Arc::new(MemoryStore::new()),
            clock.clone(),
            DEFAULT_TOKEN_TTL_DAYS,
        );
        (service, clock)
    }

    #[test]
    fn test_token_key_normalizes_email() {
        assert_eq!(
            token_key("poll1", " Alice@Example.com"),
            token_key("poll1", "alice@example.com")
        );
        assert_ne!(
            token_key("poll1", "alice@example.com"),
            token_key("poll1", "bob@example.com")
        );
        assert!(token_key("poll1", "a@b.c").starts_with("poll1:"));
        assert_eq!(token_key("poll1", "a@b.c").len(), "poll1:".len() + 64);
    }

    #[tokio::test]
    async fn test_issue_and_validate() {
        let (service, _) = service();
        let token = service.issue("poll1", "alice@example.com").await.unwrap();

        assert!(service.validate("poll1", "ALICE@example.com ", &token).await);
        assert!(!service.validate("poll1", "bob@example.com", &token).await);
        assert!(!service.validate("poll2", "alice@example.com", &token).await);
        assert!(!service.validate("poll1", "alice@example.com", "wrong").await);
    }

    #[tokio::test]
    async fn test_reissue_invalidates_previous() {
        let (service, _) = service();
        let first = service.issue("poll1", "alice@example.com").await.unwrap();
        let second = service.issue("poll1", "alice@example.com").await.unwrap();

        assert_ne!(first, second);
        assert!(!service.validate("poll1", "alice@example.com", &first).await);
        assert!(service.validate("poll1", "alice@example.com", &second).await);
    }

    #[tokio::test]
    async fn test_validity_window_is_half_open() {
        let (service, clock) = service();
        let issued_at = clock.now();
        let token = service.issue("poll1", "alice@example.com").await.unwrap();

        clock.set(issued_at - Duration::seconds(1));
        assert!(!service.validate("poll1", "alice@example.com", &token).await);

        clock.set(issued_at);
        assert!(service.validate("poll1", "alice@example.com", &token).await);

        clock.set(issued_at + Duration::days(DEFAULT_TOKEN_TTL_DAYS) - Duration::seconds(1));
        assert!(service.validate("poll1", "alice@example.com", &token).await);

        clock.set(issued_at + Duration::days(DEFAULT_TOKEN_TTL_DAYS));
        assert!(!service.validate("poll1", "alice@example.com", &token).await);
    }

    #[tokio::test]
    async fn test_validate_rejects_empty_input() {
        let (service, _) = service();
        assert!(!service.validate("", "alice@example.com", "x").await);
        assert!(!service.validate("poll1", "  ", "x").await);
        assert!(!service.validate("poll1", "alice@example.com", "").await);
        assert!(!service.validate("poll1", "nobody@example.com", "x").await);
    }

    #[tokio::test]
    async fn test_validate_fails_closed_on_storage_error() {
        let service = VotingTokenService::new(
            Arc::new(BrokenStore),
            Arc::new(ManualClock::new(Utc::now())),
            DEFAULT_TOKEN_TTL_DAYS,
        );
        assert!(!service.validate("poll1", "alice@example.com", "anything").await);
        assert!(service.issue("poll1", "alice@example.com").await.is_err());
    }
}
