//! Open-tracking pixel.

use axum::{
    Router,
    extract::{Query, State, rejection::QueryRejection},
    http::header,
    response::IntoResponse,
    routing::get,
};
use mediate_db::entities::email_tracking::EmailType;
use serde::Deserialize;

use crate::middleware::AppState;

/// 1x1 transparent GIF.
static PIXEL: [u8; 43] = [
    0x47, 0x49, 0x46, 0x38, 0x39, 0x61, 0x01, 0x00, 0x01, 0x00, 0x80, 0x00, 0x00, 0x00, 0x00,
    0x00, 0xff, 0xff, 0xff, 0x21, 0xf9, 0x04, 0x01, 0x00, 0x00, 0x00, 0x00, 0x2c, 0x00, 0x00,
    0x00, 0x00, 0x01, 0x00, 0x01, 0x00, 0x00, 0x02, 0x02, 0x44, 0x01, 0x00, 0x3b,
];

/// Pixel query parameters. Everything is optional so a mangled URL still
/// gets an image back.
#[derive(Debug, Default, Deserialize)]
pub struct OpenQuery {
    #[serde(rename = "type")]
    pub email_type: Option<String>,
    pub id: Option<String>,
    pub email: Option<String>,
    pub token: Option<String>,
}

/// Record an email open and return the pixel.
async fn track_open(
    State(state): State<AppState>,
    query: Result<Query<OpenQuery>, QueryRejection>,
) -> impl IntoResponse {
    let query = query.map(|Query(q)| q).unwrap_or_default();
    record_open(&state, query).await;

    (
        [
            (header::CONTENT_TYPE, "image/gif"),
            (header::CACHE_CONTROL, "no-store, no-cache, must-revalidate, max-age=0"),
            (header::PRAGMA, "no-cache"),
        ],
        &PIXEL[..],
    )
}

async fn record_open(state: &AppState, query: OpenQuery) {
    let (Some(email_type), Some(subject_id), Some(email)) = (
        query.email_type.as_deref().and_then(EmailType::parse),
        query.id.filter(|id| !id.is_empty()),
        query.email.filter(|e| !e.is_empty()),
    ) else {
        tracing::debug!("Incomplete tracking pixel request ignored");
        return;
    };

    // Invitation pixels carry the voting token; a stale or forged one is
    // not counted.
    if email_type == EmailType::PollInvitation {
        let token = query.token.unwrap_or_default();
        if !state.token_service.validate(&subject_id, &email, &token).await {
            tracing::debug!(poll_id = %subject_id, "Open with invalid token ignored");
            return;
        }
    }

    if let Err(e) = state.tracking.mark_opened(email_type, &subject_id, &email).await {
        tracing::warn!(subject_id = %subject_id, error = %e, "Failed to record email open");
    }
}

pub fn router() -> Router<AppState> {
    Router::new().route("/open", get(track_open))
}
