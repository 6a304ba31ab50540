//! Core business logic for mediate.

pub mod services;

pub use services::*;
