//! Common utilities and shared types for tubeline.
//!
//! This crate provides foundational components used across all tubeline crates:
//!
//! - **Configuration**: Application settings via [`Config`]
//! - **Error handling**: Unified error types via [`AppError`] and [`AppResult`]
//! - **ID Generation**: ULID-based unique identifiers via [`IdGenerator`]
//! - **Media storage**: The [`MediaStore`] collaborator and its local backend
//! - **Telemetry**: Tracing subscriber installation
//!
//! # Example
//!
//! ```no_run
//! use tubeline_common::{Config, IdGenerator, AppResult};
//!
//! fn example() -> AppResult<()> {
//!     let config = Config::load()?;
//!     tubeline_common::telemetry::init(&config.logging);
//!     let id = IdGenerator::new().generate();
//!     tracing::info!(id = %id, "Generated ID");
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod id;
pub mod storage;
pub mod telemetry;

pub use config::Config;
pub use error::{AppError, AppResult, ErrorKind};
pub use id::{IdGenerator, validate_id};
pub use storage::{
    InMemoryMediaStore, LocalMediaStore, MediaRef, MediaStore, MediaUpload, SharedMediaStore,
};
