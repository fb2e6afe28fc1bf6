//! `archiva-core` — shared collaborators for the archiva daemon.
//!
//! Holds the pieces every other crate consumes: configuration loading
//! ([`config::ArchivaConfig`]), the common error type, the SQLite
//! [`db::Database`] handle with its schema migration, and the
//! [`context::AppContext`] runtime handle injected into periodic tasks.

pub mod config;
pub mod context;
pub mod db;
pub mod error;

pub use config::ArchivaConfig;
pub use context::AppContext;
pub use db::Database;
pub use error::{ArchivaError, Result};
