//! Service health.

use axum::{Json, Router, routing::get};
use serde_json::{Value, json};

use crate::middleware::AppState;

async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health))
}
