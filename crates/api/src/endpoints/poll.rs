//! Poll management endpoints.

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, State},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use mediate_common::{AppError, AppResult};
use mediate_core::{BulkSendReport, CreatePollInput, PollDetails, PollResults};
use mediate_db::entities::poll;
use serde::{Deserialize, de::DeserializeOwned};

use crate::{
    extractors::AuthUser,
    middleware::AppState,
    response::{created, ok},
};

/// Send invitations request. Without `emails` every participant is invited.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvitationsRequest {
    #[serde(default)]
    pub emails: Option<Vec<String>>,
}

/// Finalize request. Without `optionId` the best-scoring option is chosen.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalizeRequest {
    #[serde(default)]
    pub option_id: Option<String>,
}

/// Parse an optional JSON body; an empty body means defaults.
pub(crate) fn optional_body<T: DeserializeOwned + Default>(body: &Bytes) -> AppResult<T> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body).map_err(|e| AppError::BadRequest(format!("Invalid JSON body: {e}")))
}

async fn create_poll(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Json(input): Json<CreatePollInput>,
) -> AppResult<Response> {
    let details = state.poll_service.create(&user, input).await?;
    Ok(created(details))
}

async fn get_poll(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<PollDetails>> {
    Ok(Json(state.poll_service.get(&user, &id).await?))
}

async fn delete_poll(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<impl IntoResponse> {
    state.poll_service.delete(&user, &id).await?;
    Ok(ok())
}

async fn activate_poll(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<poll::Model>> {
    Ok(Json(state.poll_service.activate(&user, &id).await?))
}

async fn send_invitations(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> AppResult<Json<BulkSendReport>> {
    let req: InvitationsRequest = optional_body(&body)?;
    let report = match req.emails {
        Some(emails) => {
            state
                .poll_service
                .send_invitations_to(&user, &id, &emails)
                .await?
        }
        None => state.poll_service.send_invitations(&user, &id).await?,
    };
    Ok(Json(report))
}

async fn finalize_poll(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> AppResult<Json<PollResults>> {
    let req: FinalizeRequest = optional_body(&body)?;
    Ok(Json(
        state.poll_service.finalize(&user, &id, req.option_id).await?,
    ))
}

async fn poll_results(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<PollResults>> {
    Ok(Json(state.poll_service.results(&user, &id).await?))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(create_poll))
        .route("/{id}", get(get_poll).delete(delete_poll))
        .route("/{id}/activate", post(activate_poll))
        .route("/{id}/invitations", post(send_invitations))
        .route("/{id}/finalize", post(finalize_poll))
        .route("/{id}/results", get(poll_results))
}
