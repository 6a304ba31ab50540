//! API response helpers.

use axum::{
    Json,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use mediate_common::AppError;
use serde::Serialize;

/// 201 with a JSON body.
pub fn created<T: Serialize>(body: T) -> Response {
    (StatusCode::CREATED, Json(body)).into_response()
}

/// Empty success response.
#[must_use]
pub fn ok() -> impl IntoResponse {
    StatusCode::NO_CONTENT
}

/// An error rendered as plain text, for pages people land on from email.
#[derive(Debug)]
pub struct PlainTextError(pub AppError);

impl From<AppError> for PlainTextError {
    fn from(err: AppError) -> Self {
        Self(err)
    }
}

impl IntoResponse for PlainTextError {
    fn into_response(self) -> Response {
        let err = self.0;
        if err.is_server_error() {
            tracing::error!(error = %err, code = err.error_code(), "Server error occurred");
        } else {
            tracing::debug!(error = %err, code = err.error_code(), "Client error occurred");
        }

        (
            err.status_code(),
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            err.user_message(),
        )
            .into_response()
    }
}
