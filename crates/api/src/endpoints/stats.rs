//! Delivery statistics.

use axum::{
    Json, Router,
    extract::{Path, State},
    routing::get,
};
use mediate_common::{AppError, AppResult};
use mediate_core::EmailStats;

use crate::{extractors::AuthUser, middleware::AppState};

/// Ledger statistics for a poll or notice owned by the caller.
async fn subject_stats(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Path(subject_id): Path<String>,
) -> AppResult<Json<EmailStats>> {
    match state.poll_service.get(&user, &subject_id).await {
        Ok(_) => {}
        Err(AppError::PollNotFound(_)) => {
            state
                .notice_service
                .get(&user, &subject_id)
                .await
                .map_err(|e| match e {
                    AppError::NoticeNotFound(id) => AppError::NotFound(id),
                    other => other,
                })?;
        }
        Err(e) => return Err(e),
    }

    Ok(Json(state.tracking.stats(&subject_id).await?))
}

pub fn router() -> Router<AppState> {
    Router::new().route("/{subject_id}", get(subject_stats))
}
