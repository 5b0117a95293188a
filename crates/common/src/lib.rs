#![deny(missing_docs)]

//! Shared error taxonomy, scalar values, schemas, and session context for
//! Quarry crates.
//!
//! Architecture role:
//! - defines the [`Error`] / [`Result`] contracts every layer reports through
//! - provides the scalar [`Value`] / [`Row`] model rows are evaluated against
//! - hosts the [`Schema`] vocabulary shared by storage and the planner
//! - carries the per-session [`SessionContext`] with its cancellation token
//!
//! Key modules:
//! - [`config`]
//! - [`context`]
//! - [`error`]
//! - [`schema`]
//! - [`value`]

/// Engine/session configuration types.
pub mod config;
/// Per-session context and cancellation.
pub mod context;
/// Shared error taxonomy.
pub mod error;
/// Column and schema vocabulary.
pub mod schema;
/// Scalar values and rows.
pub mod value;

pub use config::EngineConfig;
pub use context::SessionContext;
pub use error::{Error, Result};
pub use schema::{Column, Schema};
pub use value::{Row, Value};
