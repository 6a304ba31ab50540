//! Common utilities and shared types for mediate.
//!
//! This crate provides foundational components used across all mediate crates:
//!
//! - **Configuration**: Application settings via [`Config`]
//! - **Error handling**: Unified error types via [`AppError`] and [`AppResult`]
//! - **ID Generation**: ULID identifiers and random tokens via [`IdGenerator`]
//! - **Clock**: Injectable time source via [`Clock`]
//! - **Storage**: Blob storage with time-limited signed URLs via [`BlobStore`]
//!
//! # Example
//!
//! ```no_run
//! use mediate_common::{Config, IdGenerator, AppResult};
//!
//! fn example() -> AppResult<()> {
//!     let config = Config::load()?;
//!     let id_gen = IdGenerator::new();
//!     let id = id_gen.generate();
//!     println!("Generated ID: {} for {}", id, config.server.url);
//!     Ok(())
//! }
//! ```

pub mod clock;
pub mod config;
pub mod error;
pub mod id;
pub mod storage;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::Config;
pub use error::{AppError, AppResult};
pub use id::{IdGenerator, normalize_email};
pub use storage::{BlobAccess, BlobMetadata, BlobStore, LocalBlobStore, SignedUrl};
