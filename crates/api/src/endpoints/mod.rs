//! API endpoints.

mod meta;
mod notices;
mod poll;
mod stats;
mod tracking;
mod vote;

use axum::{Router, middleware};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::middleware::{AppState, auth_middleware};

/// Create the API router.
pub fn router() -> Router<AppState> {
    Router::new()
        .nest("/track", tracking::router())
        .nest("/polls", poll::router().merge(vote::router()))
        .nest("/notices", notices::router())
        .nest("/stats", stats::router())
}

/// The complete application: `/api`, `/health` and the middleware stack.
pub fn app(state: AppState) -> Router {
    Router::new()
        .nest("/api", router())
        .merge(meta::router())
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
