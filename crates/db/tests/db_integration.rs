//! Database integration tests.
//!
//! These tests require a running `PostgreSQL` instance.
//! Run with: `cargo test --test db_integration -- --ignored`
//!
//! Environment variables:
//!   `TEST_DB_HOST` (default: localhost)
//!   `TEST_DB_PORT` (default: 5433)
//!   `TEST_DB_USER` (default: `mediate_test`)
//!   `TEST_DB_PASSWORD` (default: `mediate_test`)
//!   `TEST_DB_NAME` (default: `mediate_test`)

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;

use chrono::{Duration, Utc};
use mediate_db::{
    NewPoll, Stores,
    entities::{
        email_tracking::{self, DeliveryStatus, EmailType},
        poll::{self, PollStatus},
        poll_option, poll_participant,
        vote::{self, VoteType},
        voting_token,
    },
    test_utils::{TestDatabase, TestDbConfig},
};

async fn stores() -> (TestDbConfig, Stores) {
    let db = TestDatabase::new().await.expect("Failed to connect");
    db.cleanup().await.expect("Cleanup failed");
    let TestDatabase { conn, config } = db;
    let stores = Stores::postgres(Arc::new(conn));
    (config, stores)
}

fn new_poll(id: &str) -> NewPoll {
    let now = Utc::now();
    NewPoll {
        poll: poll::Model {
            id: id.to_string(),
            creator_id: "user1".to_string(),
            case_id: None,
            title: "Session".to_string(),
            description: None,
            organizer_name: "Dana".to_string(),
            status: PollStatus::Active,
            finalized_option_id: None,
            emails_sent: 0,
            emails_opened: 0,
            created_at: now.into(),
            updated_at: None,
        },
        options: vec![poll_option::Model {
            id: format!("{id}-o1"),
            poll_id: id.to_string(),
            position: 0,
            starts_at: (now + Duration::days(1)).into(),
            ends_at: None,
            label: None,
        }],
        participants: vec![poll_participant::Model {
            id: format!("{id}-p1"),
            poll_id: id.to_string(),
            email: "alice@example.com".to_string(),
            name: None,
        }],
    }
}

fn vote_for(poll_id: &str, id: &str, vote_type: VoteType) -> vote::Model {
    vote::Model {
        id: id.to_string(),
        poll_id: poll_id.to_string(),
        option_id: format!("{poll_id}-o1"),
        participant_email: "alice@example.com".to_string(),
        vote_type,
        source: "email".to_string(),
        created_at: Utc::now().into(),
    }
}

#[tokio::test]
#[ignore = "requires running PostgreSQL instance"]
async fn test_database_connection() {
    let result = TestDatabase::with_config(TestDbConfig::default()).await;
    assert!(result.is_ok(), "Failed to connect: {:?}", result.err());
}

#[tokio::test]
#[ignore = "requires running PostgreSQL instance"]
async fn test_token_upsert_overwrites() {
    let (_db, stores) = stores().await;
    let now = Utc::now();

    for token in ["first", "second"] {
        stores
            .tokens
            .upsert(voting_token::Model {
                key: "poll1:abc".to_string(),
                poll_id: "poll1".to_string(),
                participant_email: "alice@example.com".to_string(),
                token: token.to_string(),
                created_at: now.into(),
                expires_at: (now + Duration::days(30)).into(),
            })
            .await
            .unwrap();
    }

    let stored = stores.tokens.find("poll1:abc").await.unwrap().unwrap();
    assert_eq!(stored.token, "second");
}

#[tokio::test]
#[ignore = "requires running PostgreSQL instance"]
async fn test_replace_votes_and_cascade_delete() {
    let (_db, stores) = stores().await;
    stores.polls.create(new_poll("poll1")).await.unwrap();

    stores
        .votes
        .replace_votes("poll1", "alice@example.com", vec![vote_for("poll1", "v1", VoteType::Yes)])
        .await
        .unwrap();
    stores
        .votes
        .replace_votes("poll1", "alice@example.com", vec![vote_for("poll1", "v2", VoteType::No)])
        .await
        .unwrap();

    let votes = stores.votes.find_by_participant("poll1", "alice@example.com").await.unwrap();
    assert_eq!(votes.len(), 1);
    assert_eq!(votes[0].vote_type, VoteType::No);

    stores.polls.delete("poll1").await.unwrap();
    assert!(stores.polls.find_by_id("poll1").await.unwrap().is_none());
    assert!(stores.polls.find_options("poll1").await.unwrap().is_empty());
    assert!(stores.votes.find_by_poll("poll1").await.unwrap().is_empty());
}

#[tokio::test]
#[ignore = "requires running PostgreSQL instance"]
async fn test_mark_opened_is_conditional() {
    let (_db, stores) = stores().await;
    let now = Utc::now();

    let record = stores
        .tracking
        .insert(email_tracking::Model {
            id: "t1".to_string(),
            email_type: EmailType::MediationNotice,
            subject_id: "notice1".to_string(),
            participant_email: "alice@example.com".to_string(),
            sequence: 1,
            status: DeliveryStatus::Sent,
            opened: false,
            opened_at: None,
            voted_via_email: false,
            voted_via_email_at: None,
            external_id: None,
            error_message: None,
            retry_count: 0,
            created_at: now.into(),
            updated_at: now.into(),
        })
        .await
        .unwrap();

    assert!(stores.tracking.mark_opened(&record.id, now).await.unwrap());
    assert!(!stores.tracking.mark_opened(&record.id, now + Duration::hours(1)).await.unwrap());

    let latest = stores
        .tracking
        .find_latest(EmailType::MediationNotice, "notice1", "alice@example.com", false)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(latest.status, DeliveryStatus::Opened);
    assert_eq!(latest.opened_at.unwrap().timestamp(), now.timestamp());

    assert_eq!(stores.tracking.delete_by_subject("notice1").await.unwrap(), 1);
}

#[tokio::test]
#[ignore = "requires running PostgreSQL instance"]
async fn test_tracking_sequence_is_unique_per_key() {
    let (_db, stores) = stores().await;
    let now = Utc::now();
    let record = |id: &str| email_tracking::Model {
        id: id.to_string(),
        email_type: EmailType::PollInvitation,
        subject_id: "poll1".to_string(),
        participant_email: "alice@example.com".to_string(),
        sequence: 1,
        status: DeliveryStatus::Sent,
        opened: false,
        opened_at: None,
        voted_via_email: false,
        voted_via_email_at: None,
        external_id: None,
        error_message: None,
        retry_count: 0,
        created_at: now.into(),
        updated_at: now.into(),
    };

    stores.tracking.insert(record("t1")).await.unwrap();
    let result = stores.tracking.insert(record("t2")).await;
    assert!(matches!(result, Err(mediate_common::AppError::Conflict(_))));
}

#[test]
fn test_config_from_env() {
    let config = TestDbConfig::default();
    assert!(!config.host.is_empty());
    assert!(config.port > 0);
    assert!(config.database_url().starts_with("postgres://"));
}
