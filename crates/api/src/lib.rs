//! HTTP API layer for mediate.
//!
//! This crate exposes the poll and notice services over HTTP:
//!
//! - **Public endpoints**: open-tracking pixel and the emailed vote form
//! - **Management endpoints**: polls, notices and delivery statistics,
//!   behind bearer authentication
//! - **Middleware**: authentication, tracing, CORS
//!
//! Built on Axum 0.8 with Tower middleware stack.

pub mod endpoints;
pub mod extractors;
pub mod middleware;
pub mod response;

pub use endpoints::{app, router};
pub use middleware::{AppState, Collaborators};
