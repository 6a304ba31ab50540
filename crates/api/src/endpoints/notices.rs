//! Mediation notice endpoints.

use axum::{
    Json, Router,
    extract::{Path, State},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use mediate_common::AppResult;
use mediate_core::{BulkSendReport, CreateNoticeInput, UploadTicket};
use mediate_db::entities::mediation_notice;
use serde::Deserialize;

use crate::{
    extractors::AuthUser,
    middleware::AppState,
    response::{created, ok},
};

/// Upload URL request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadRequest {
    pub case_id: String,
    pub filename: String,
}

async fn create_notice(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Json(input): Json<CreateNoticeInput>,
) -> AppResult<Response> {
    let notice = state.notice_service.create(&user, input).await?;
    Ok(created(notice))
}

async fn get_notice(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<mediation_notice::Model>> {
    Ok(Json(state.notice_service.get(&user, &id).await?))
}

async fn delete_notice(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<impl IntoResponse> {
    state.notice_service.delete(&user, &id).await?;
    Ok(ok())
}

async fn send_notice(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<BulkSendReport>> {
    Ok(Json(state.notice_service.send(&user, &id).await?))
}

async fn upload_url(
    AuthUser(_user): AuthUser,
    State(state): State<AppState>,
    Json(req): Json<UploadRequest>,
) -> AppResult<Json<UploadTicket>> {
    Ok(Json(
        state
            .notice_service
            .upload_url(&req.case_id, &req.filename)
            .await?,
    ))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(create_notice))
        .route("/uploads", post(upload_url))
        .route("/{id}", get(get_notice).delete(delete_notice))
        .route("/{id}/send", post(send_notice))
}
