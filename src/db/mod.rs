//! Database module.
//!
//! This module provides:
//! - Connection provider with scoped sessions and degraded (no database) mode
//! - URL normalization and backend classification
//! - Startup migrations behind a pluggable runner

pub mod dsn;
pub mod migrations;
pub mod provider;

pub use dsn::{normalize_database_url, DatabaseKind};
pub use migrations::{
    run_startup_migrations, MigrationError, MigrationOutcome, MigrationRunner, SqlxMigrationRunner,
};
pub use provider::{Database, PoolStrategy, Session};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("Unsupported database URL scheme: {0}")]
    UnsupportedScheme(String),
    #[error("Session already closed")]
    SessionClosed,
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),
}
