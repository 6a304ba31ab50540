//! Vote form submitted from invitation emails.

use axum::{
    Form, Router,
    extract::State,
    response::{IntoResponse, Redirect},
    routing::post,
};
use mediate_common::AppError;
use mediate_core::VoteSubmission;

use crate::{middleware::AppState, response::PlainTextError};

/// Take a required form field.
fn field(fields: &[(String, String)], name: &str) -> Result<String, AppError> {
    fields
        .iter()
        .rev()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .ok_or_else(|| AppError::BadRequest(format!("Missing required field: {name}")))
}

/// Record the votes and send the voter to the confirmation page.
async fn submit_vote(
    State(state): State<AppState>,
    Form(fields): Form<Vec<(String, String)>>,
) -> Result<impl IntoResponse, PlainTextError> {
    let submission = VoteSubmission {
        poll_id: field(&fields, "pollId")?,
        email: field(&fields, "email")?,
        token: field(&fields, "token")?,
        source: field(&fields, "source").unwrap_or_else(|_| "email".to_string()),
        selections: fields,
    };

    let receipt = state.vote_service.submit_vote(submission).await?;
    tracing::debug!(poll_id = %receipt.poll_id, accepted = receipt.accepted, "Vote form accepted");

    Ok(Redirect::to(&state.vote_confirmation_url))
}

pub fn router() -> Router<AppState> {
    Router::new().route("/vote", post(submit_vote))
}
